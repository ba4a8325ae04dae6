use crate::{ConsoleSink, ConsoleWriter};
use core::fmt::Write;
use kernel_sync::SpinLock;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// A `log` backend writing one line per record to a [`ConsoleSink`].
pub struct KernelLogger<S: ConsoleSink> {
    max_level: LevelFilter,
    sink: S,
    line: SpinLock<()>,
}

impl<S: ConsoleSink> KernelLogger<S> {
    #[must_use]
    pub const fn new(sink: S, max_level: LevelFilter) -> Self {
        Self {
            max_level,
            sink,
            line: SpinLock::new(()),
        }
    }

    /// Installs this logger as the global `log` backend.
    ///
    /// Call this once during early init.
    ///
    /// # Errors
    /// Fails if some logger was already installed.
    pub fn init(&'static self) -> Result<(), SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(self.max_level);
        Ok(())
    }

    pub const fn sink(&self) -> &S {
        &self.sink
    }
}

impl<S: ConsoleSink> Log for KernelLogger<S> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Format: "[LEVEL] target: message\n"
        let _line = self.line.lock();
        let _ = writeln!(
            ConsoleWriter(&self.sink),
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        // unbuffered
    }
}
