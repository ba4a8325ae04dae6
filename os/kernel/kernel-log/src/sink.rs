use core::fmt::{self, Write};
use core::ptr;

/// Destination for console bytes.
pub trait ConsoleSink: Send + Sync {
    /// Writes all of `bytes`, blocking as needed.
    fn write_bytes(&self, bytes: &[u8]);
}

impl<S: ConsoleSink + ?Sized> ConsoleSink for &S {
    #[inline]
    fn write_bytes(&self, bytes: &[u8]) {
        (**self).write_bytes(bytes);
    }
}

/// Adapts a [`ConsoleSink`] to [`core::fmt::Write`] without allocating.
pub struct ConsoleWriter<'a, S: ConsoleSink + ?Sized>(pub &'a S);

impl<S: ConsoleSink + ?Sized> Write for ConsoleWriter<'_, S> {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_bytes(s.as_bytes());
        Ok(())
    }

    #[inline]
    fn write_char(&mut self, c: char) -> fmt::Result {
        // UTF-8 encode without allocation.
        let mut buf = [0u8; 4];
        let s = c.encode_utf8(&mut buf);
        self.write_str(s)
    }
}

/// Transmit holding register.
const THR: usize = 0;

/// Line status register.
const LSR: usize = 5;

/// LSR bit: THR can accept another character.
const LSR_TX_IDLE: u8 = 1 << 5;

/// A 16550-compatible UART, polled for every byte.
pub struct Uart16550 {
    base: usize,
}

impl Uart16550 {
    /// The console UART of the board, at [`UART0`](kernel_info::memory::UART0).
    ///
    /// # Safety
    /// The UART registers must be mapped at their physical address and no
    /// other code may drive the transmitter.
    #[must_use]
    pub const unsafe fn board() -> Self {
        // SAFETY: forwarded to the caller.
        unsafe { Self::new(kernel_info::memory::UART0 as usize) }
    }

    /// # Safety
    /// `base` must point at the register block of a 16550-compatible UART.
    #[must_use]
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    fn putc(&self, c: u8) {
        let base = self.base as *mut u8;
        // SAFETY: `new` requires `base` to be a live UART register block.
        unsafe {
            while ptr::read_volatile(base.add(LSR)) & LSR_TX_IDLE == 0 {
                core::hint::spin_loop();
            }
            ptr::write_volatile(base.add(THR), c);
        }
    }
}

impl ConsoleSink for Uart16550 {
    fn write_bytes(&self, bytes: &[u8]) {
        for &b in bytes {
            self.putc(b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_sync::SpinLock;

    struct Capture(SpinLock<Vec<u8>>);

    impl ConsoleSink for Capture {
        fn write_bytes(&self, bytes: &[u8]) {
            self.0.lock().extend_from_slice(bytes);
        }
    }

    #[test]
    fn writer_forwards_formatted_text() {
        let sink = Capture(SpinLock::new(Vec::new()));
        write!(ConsoleWriter(&sink), "{}-{:#x}-{}", "pa", 0x1000, 'ä').unwrap();
        assert_eq!(sink.0.lock().as_slice(), "pa-0x1000-ä".as_bytes());
    }

    #[test]
    fn uart_polls_before_each_byte() {
        // Fake register block with the transmitter always idle.
        let mut regs = [0u8; 8];
        regs[LSR] = LSR_TX_IDLE;
        let uart = unsafe { Uart16550::new(regs.as_mut_ptr() as usize) };
        uart.write_bytes(b"ok");
        assert_eq!(regs[THR], b'k');
    }
}
