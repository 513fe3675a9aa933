//! Directory-backed, append-mostly time-series storage engine.
//!
//! A device is a named time series; a device's data lives under its own
//! directory as one shard file per calendar day (`ROOT/YYYY/MM/DD.txt`).
//! [`DirectoryDriver`] is the engine's core surface — open it, append or
//! insert measurements, sort a shard back into order, or run a range
//! query — and [`Device`] binds a driver's configuration to a name with
//! automatically-closing reader/writer sessions.

pub mod access;
pub mod codec;
pub mod config;
pub mod cursor;
pub mod device;
pub mod driver;
pub mod encoding;
pub mod error;

mod cache;
mod reader;
mod shard;

pub use access::AccessType;
pub use codec::{FloatCodec, StringCodec, ValueCodec};
pub use config::DatabaseConfig;
pub use cursor::{max_time_of_day, Cursor, CursorIter};
pub use device::{Device, DeviceSession};
pub use driver::DirectoryDriver;
pub use encoding::Encoding;
pub use error::{Error, Result};
