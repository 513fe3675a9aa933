//! Error types shared by every component of the driver.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the storage engine.
///
/// Mirrors the four error kinds from the driver's design: usage errors and
/// range errors never touch the filesystem, parse errors carry shard/line
/// context, and I/O errors propagate filesystem failures unchanged. A
/// missing shard during a read is not represented here — callers treat it
/// as an empty shard rather than an error.
#[derive(Debug, Error)]
pub enum Error {
    /// The driver was not open, lacked the access flag a call required, or
    /// a cursor outlived the driver that produced it. Programmer mistakes,
    /// not runtime conditions, but still reported rather than panicking so
    /// hosts can surface them without aborting.
    #[error("{0}")]
    Usage(String),

    /// `query_interval(start, stop)` was called with `start > stop`.
    #[error("query start ({start}) is after stop ({stop})")]
    Range { start: String, stop: String },

    /// A line could not be decoded: either its time-of-day field was
    /// malformed, or the value codec rejected its cells. `line` is the
    /// signed, 1-based line number in the direction of iteration (negative
    /// under reverse iteration).
    #[error("failed to parse {} at line {line}: {message}", shard.display())]
    Parse {
        shard: PathBuf,
        line: i64,
        message: String,
    },

    /// An underlying filesystem failure other than "not found" while a
    /// shard was not already being treated as empty.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Database/device configuration could not be loaded or parsed.
    #[error("failed to load configuration from {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },
}

/// Causes of a configuration load failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn range(start: impl std::fmt::Display, stop: impl std::fmt::Display) -> Self {
        Error::Range {
            start: start.to_string(),
            stop: stop.to_string(),
        }
    }
}

/// Builds the signed, 1-based line number carried by [`Error::Parse`]:
/// positive and counted from the start under forward iteration, negative
/// under reverse iteration.
pub(crate) fn signed_line_number(count: u64, reverse: bool) -> i64 {
    let n = count as i64;
    if reverse { -n } else { n }
}

pub type Result<T> = std::result::Result<T, Error>;
