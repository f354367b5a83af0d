//! Console logging.

use alloc::boxed::Box;
use core::fmt::{self, Write};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// A byte sink, such as a serial port.
pub trait Console: Send + Sync {
    fn putch(&self, byte: u8);
}

struct Sink<'a, C: ?Sized>(&'a C);

impl<C: Console + ?Sized> Write for Sink<'_, C> {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            self.0.putch(b);
        }
        Ok(())
    }
}

pub struct ConsoleLogger<C> {
    console: C,
    max_level: LevelFilter,
}

impl<C: Console + 'static> ConsoleLogger<C> {
    #[must_use]
    pub const fn new(console: C, max_level: LevelFilter) -> Self {
        Self { console, max_level }
    }

    #[must_use]
    pub const fn console(&self) -> &C {
        &self.console
    }

    /// Installs the logger. Call this once during early init.
    ///
    /// # Errors
    /// If a logger has already been installed.
    pub fn init(self) -> Result<(), SetLoggerError> {
        let max_level = self.max_level;
        log::set_logger(Box::leak(Box::new(self)))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl<C: Console> Log for ConsoleLogger<C> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Best effort; the sink itself never fails.
        let _ = writeln!(
            Sink(&self.console),
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}
