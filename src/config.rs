use std::{fs, path::Path, time::Duration};

use ron::{Options, extensions::Extensions};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{channel::Channel, telem::TimeSpan};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct FramerConfig {
    #[serde(default)]
    pub reader: ReaderConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub channels: Vec<Channel>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// quiet period before a batch of pending fetches runs
    pub debounce_ms: u64,
    /// pending ranges whose starts and ends both lie within this are fetched together
    pub merge_tolerance_ms: u64,
    /// capacity of the pending fetch queue
    pub queue_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            merge_tolerance_ms: 5,
            queue_size: 1000,
        }
    }
}

impl ReaderConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn merge_tolerance(&self) -> TimeSpan {
        TimeSpan::from(Duration::from_millis(self.merge_tolerance_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// unreferenced entries older than this are dropped by gc
    pub stale_after_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_after_ms: 20_000,
        }
    }
}

impl CacheConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }
}

impl FramerConfig {
    pub fn from_file(file_path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::parse(&fs::read_to_string(file_path)?)
    }

    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let options = Options::default()
            .with_default_extension(Extensions::IMPLICIT_SOME)
            .with_default_extension(Extensions::UNWRAP_NEWTYPES)
            .with_default_extension(Extensions::UNWRAP_VARIANT_NEWTYPES);
        Ok(options.from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telem::DataType;

    #[test]
    fn test_defaults() {
        let cfg = FramerConfig::parse("()").unwrap();
        assert_eq!(cfg, FramerConfig::default());
        assert_eq!(cfg.reader.debounce(), Duration::from_millis(50));
        assert_eq!(cfg.reader.merge_tolerance(), TimeSpan::milliseconds(5));
        assert_eq!(cfg.cache.stale_after(), Duration::from_secs(20));
    }

    #[test]
    fn test_parse() {
        let cfg = FramerConfig::parse(
            r#"(
                reader: (debounce_ms: 10),
                cache: (stale_after_ms: 500),
                channels: [
                    (key: 1, name: "time", data_type: TimeStamp, index: 1),
                    (key: 2, name: "pressure", data_type: Float32, index: 1),
                    (key: 3, name: "virtual", data_type: Uint8),
                ],
            )"#,
        )
        .unwrap();
        assert_eq!(cfg.reader.debounce_ms, 10);
        assert_eq!(cfg.reader.merge_tolerance_ms, 5);
        assert_eq!(cfg.cache.stale_after_ms, 500);
        assert_eq!(cfg.channels.len(), 3);
        assert_eq!(cfg.channels[1].data_type, DataType::Float32);
        assert_eq!(cfg.channels[1].index, Some(1));
        assert_eq!(cfg.channels[2].index, None);
    }

    #[test]
    fn test_parse_error() {
        assert!(FramerConfig::parse("(reader: 5)").is_err());
    }
}
