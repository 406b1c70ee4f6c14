use std::{
    fmt::{self, Arguments},
    time::Instant,
};

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

use super::OutputSink;

/// How much a method object writes to its output sink. Levels are ordered, a
/// message is written if its level is at most the configured verbosity.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Verbosity {
    Quiet = 0,
    Error = 1,
    Warn = 2,
    #[default]
    Note = 3,
    Info = 4,
    Debug = 5,
    Debug1 = 6,
    Debug2 = 7,
    Debug3 = 8,
    Debug4 = 9,
}

impl Verbosity {
    pub const ALL: [Verbosity; 10] = [
        Verbosity::Quiet,
        Verbosity::Error,
        Verbosity::Warn,
        Verbosity::Note,
        Verbosity::Info,
        Verbosity::Debug,
        Verbosity::Debug1,
        Verbosity::Debug2,
        Verbosity::Debug3,
        Verbosity::Debug4,
    ];

    /// The level used when mirroring a message to the `log` facade.
    fn log_level(self) -> log::Level {
        match self {
            // quiet messages are never emitted
            Verbosity::Quiet | Verbosity::Error => log::Level::Error,
            Verbosity::Warn => log::Level::Warn,
            Verbosity::Note | Verbosity::Info => log::Level::Info,
            Verbosity::Debug => log::Level::Debug,
            _ => log::Level::Trace,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Verbosity::Error => "ERROR: ",
            Verbosity::Warn => "WARN: ",
            _ => "",
        }
    }
}

impl TryFrom<u8> for Verbosity {
    type Error = ConfigurationError;

    fn try_from(value: u8) -> Result<Self, ConfigurationError> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or(ConfigurationError::InvalidVerbosity(value))
    }
}

impl From<Verbosity> for u8 {
    fn from(value: Verbosity) -> Self {
        value as u8
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// Writes verbosity-gated lines to an output sink and mirrors them to the `log`
/// facade.
///
/// A logger borrows the verbosity and sink of the object it logs for, so it
/// always reflects that object's local overrides.
pub struct Logger<'a> {
    verbosity: Verbosity,
    sink: &'a OutputSink,
    target: &'static str,
}

impl<'a> Logger<'a> {
    pub fn new(verbosity: Verbosity, sink: &'a OutputSink, target: &'static str) -> Self {
        Self {
            verbosity,
            sink,
            target,
        }
    }

    pub fn enabled(&self, level: Verbosity) -> bool {
        level != Verbosity::Quiet && level <= self.verbosity
    }

    pub fn log(&self, level: Verbosity, args: Arguments<'_>) {
        if !self.enabled(level) {
            return;
        }

        log::log!(target: self.target, level.log_level(), "{args}");

        let line = format!("{}{args}", level.label());
        if let Err(err) = self.sink.write_line(&line) {
            log::error!(target: self.target, "could not write to output sink: {err}");
        }
    }

    pub fn error(&self, args: Arguments<'_>) {
        self.log(Verbosity::Error, args)
    }

    pub fn warn(&self, args: Arguments<'_>) {
        self.log(Verbosity::Warn, args)
    }

    pub fn note(&self, args: Arguments<'_>) {
        self.log(Verbosity::Note, args)
    }

    pub fn info(&self, args: Arguments<'_>) {
        self.log(Verbosity::Info, args)
    }

    pub fn debug(&self, args: Arguments<'_>) {
        self.log(Verbosity::Debug, args)
    }

    pub fn debug1(&self, args: Arguments<'_>) {
        self.log(Verbosity::Debug1, args)
    }

    /// Reports the wall time spent since `start` and returns a new starting point.
    pub fn timer(&self, what: &str, start: Instant) -> Instant {
        self.debug(format_args!("    wall time for {what} {:0.2?}", start.elapsed()));
        Instant::now()
    }
}
