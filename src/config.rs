//! Database configuration (C8).
//!
//! A small TOML-backed config describing where a database root lives and
//! the I/O defaults new devices should inherit. `taransaydb` hardcodes
//! these as constructor arguments; this crate externalises them into a
//! config file the way the rest of the corpus does for its own
//! command-line tools.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::encoding::Encoding;
use crate::error::{ConfigError, Error, Result};
use crate::reader::DEFAULT_BLOCK_SIZE;

/// On-disk configuration for a database: its root directory and the I/O
/// defaults devices opened against it should use unless overridden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub root: PathBuf,

    #[serde(default)]
    pub encoding: ConfiguredEncoding,

    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

/// `Encoding` mirrored for serde: kept separate so the engine's core enum
/// never needs a `serde` dependency of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfiguredEncoding {
    #[default]
    Utf8,
    Latin1,
}

impl From<ConfiguredEncoding> for Encoding {
    fn from(value: ConfiguredEncoding) -> Self {
        match value {
            ConfiguredEncoding::Utf8 => Encoding::Utf8,
            ConfiguredEncoding::Latin1 => Encoding::Latin1,
        }
    }
}

impl DatabaseConfig {
    /// Builds a config directly, with default encoding and block size.
    /// A config never touches `root` itself — path creation remains the
    /// driver's job, so a nonexistent root is not an error here.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            encoding: ConfiguredEncoding::default(),
            block_size: default_block_size(),
        }
    }

    /// Loads and parses a TOML config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            source: ConfigError::Io(e),
        })?;
        toml::from_str(&text).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            source: ConfigError::Toml(e),
        })
    }

    /// Serializes this configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            Error::Usage(format!("failed to serialize configuration: {e}"))
        })
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_toml() {
        let config = DatabaseConfig {
            root: PathBuf::from("/var/lib/daylog"),
            encoding: ConfiguredEncoding::Latin1,
            block_size: 4096,
        };
        let text = config.to_toml().unwrap();
        let parsed: DatabaseConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn defaults_apply_when_omitted() {
        let parsed: DatabaseConfig = toml::from_str(r#"root = "/var/lib/daylog""#).unwrap();
        assert_eq!(parsed.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(parsed.encoding(), Encoding::Utf8);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = DatabaseConfig::load("/does/not/exist.toml").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
