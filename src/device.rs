//! Device (C7).
//!
//! Binds a directory driver's configuration — root, encoding, value codec
//! — to a name, and hands out scoped driver sessions that close
//! themselves on every exit path. Ported from `Device.reader`/
//! `Device.writer`'s `@contextmanager` pair in
//! `examples/original_source/taransaydb/device.py`; the context manager's
//! "always runs on exit, including exceptions" guarantee becomes Rust's
//! `Drop`, which additionally covers an early `return` or `?` inside the
//! caller's session block, something a context manager also covers but a
//! hand-rolled try/finally would not.

use std::ops::Deref;
use std::path::PathBuf;

use crate::access::AccessType;
use crate::codec::ValueCodec;
use crate::config::DatabaseConfig;
use crate::driver::DirectoryDriver;
use crate::encoding::Encoding;
use crate::error::Result;
use crate::reader::DEFAULT_BLOCK_SIZE;

/// A named time series rooted at `database/name`.
pub struct Device<C: ValueCodec + Clone> {
    database: PathBuf,
    name: String,
    encoding: Encoding,
    block_size: usize,
    codec: C,
}

impl<C: ValueCodec + Clone> Device<C> {
    pub fn new(database: impl Into<PathBuf>, name: impl Into<String>, encoding: Encoding, codec: C) -> Self {
        Self {
            database: database.into(),
            name: name.into(),
            encoding,
            block_size: DEFAULT_BLOCK_SIZE,
            codec,
        }
    }

    /// Builds a device from a loaded [`DatabaseConfig`], inheriting its
    /// `encoding`/`block_size` defaults instead of the crate's own
    /// (`spec.md` §4.8: a config supplies "per-device defaults… devices
    /// should inherit"). The value codec is still supplied by the caller,
    /// since a config file has no notion of cell shape.
    pub fn from_config(config: &DatabaseConfig, name: impl Into<String>, codec: C) -> Self {
        Self {
            database: config.root.clone(),
            name: name.into(),
            encoding: config.encoding(),
            block_size: config.block_size,
            codec,
        }
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> PathBuf {
        self.database.join(&self.name)
    }

    /// Opens a read-only session over this device's shards.
    pub fn reader(&self) -> DeviceSession<C> {
        self.session(AccessType::READ)
    }

    /// Opens a session permitted to append and rewrite this device's
    /// shards.
    pub fn writer(&self) -> DeviceSession<C> {
        self.session(AccessType::WRITE)
    }

    fn session(&self, access: AccessType) -> DeviceSession<C> {
        let driver = DirectoryDriver::new(self.path(), access, self.encoding, self.codec.clone())
            .with_block_size(self.block_size);
        driver.open();
        DeviceSession { driver }
    }

    /// Opens a writer, sorts every shard, and closes it again.
    pub fn sort(&self) -> Result<()> {
        self.writer().sort()
    }
}

/// A driver opened for one logical unit of work, closed automatically
/// when this value drops — success, early return, or unwind alike.
/// Derefs to [`DirectoryDriver`] so callers use it exactly like the
/// driver itself.
pub struct DeviceSession<C: ValueCodec> {
    driver: DirectoryDriver<C>,
}

impl<C: ValueCodec> Deref for DeviceSession<C> {
    type Target = DirectoryDriver<C>;

    fn deref(&self) -> &DirectoryDriver<C> {
        &self.driver
    }
}

impl<C: ValueCodec> Drop for DeviceSession<C> {
    fn drop(&mut self) {
        self.driver.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::StringCodec;
    use chrono::NaiveDate;

    #[test]
    fn session_closes_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let device = Device::new(tmp.path(), "power", Encoding::Utf8, StringCodec);

        {
            let writer = device.writer();
            let tick = NaiveDate::from_ymd_opt(2020, 4, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap();
            writer.append(tick, &vec!["1.0".to_string()]).unwrap();
            assert!(writer.is_open());
        }

        let reader = device.reader();
        let rows: Vec<_> = reader
            .query_interval(
                NaiveDate::from_ymd_opt(2020, 4, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
                NaiveDate::from_ymd_opt(2020, 4, 2).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            )
            .unwrap()
            .iter()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn device_path_joins_database_and_name() {
        let device = Device::new("/db", "power", Encoding::Utf8, StringCodec);
        assert_eq!(device.path(), PathBuf::from("/db/power"));
    }

    #[test]
    fn from_config_inherits_root_encoding_and_block_size() {
        use crate::config::{ConfiguredEncoding, DatabaseConfig};

        let config = DatabaseConfig {
            root: PathBuf::from("/db"),
            encoding: ConfiguredEncoding::Latin1,
            block_size: 4096,
        };
        let device = Device::from_config(&config, "power", StringCodec);

        assert_eq!(device.path(), PathBuf::from("/db/power"));
        assert_eq!(device.encoding, Encoding::Latin1);
        assert_eq!(device.block_size, 4096);
    }
}
