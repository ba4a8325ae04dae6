//! # Kernel Console Logging
//!
//! Routes the [`log`] facade to a byte-oriented console.
//!
//! ## Overview
//!
//! Every crate of the memory core logs through `log` macros only; this crate
//! supplies the backend. A [`KernelLogger`] formats each record as
//!
//! ```text
//! [LEVEL] target: message
//! ```
//!
//! and hands the bytes to a [`ConsoleSink`]. Lines are serialized through a
//! spin lock so concurrent cores never interleave characters within a line.
//!
//! ## Sinks
//!
//! * [`Uart16550`]: the board's memory-mapped serial port, polled.
//! * Anything else implementing [`ConsoleSink`], e.g. a capture buffer in
//!   host-side tests.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_log::{ConsoleSink, KernelLogger};
//! use log::LevelFilter;
//!
//! struct Discard;
//! impl ConsoleSink for Discard {
//!     fn write_bytes(&self, _bytes: &[u8]) {}
//! }
//!
//! static LOGGER: KernelLogger<Discard> = KernelLogger::new(Discard, LevelFilter::Info);
//! LOGGER.init().expect("logger installed once");
//! log::info!("memory core up");
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;
mod sink;

pub use logger::KernelLogger;
pub use sink::{ConsoleSink, ConsoleWriter, Uart16550};
