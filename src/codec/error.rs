use thiserror::Error;

use crate::{channel::ChannelKey, telem::DataType};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("unknown channel `{0}`")]
    UnknownChannel(ChannelKey),
    #[error("channel `{key}` expects {expected} but series is {actual}")]
    DataTypeMismatch {
        key: ChannelKey,
        expected: DataType,
        actual: DataType,
    },
    #[error("codec configured with {keys} keys but {data_types} data types")]
    ConfigMismatch { keys: usize, data_types: usize },
    #[error("series for channel `{key}` has {len} samples, more than a frame can carry")]
    SeriesTooLarge { key: ChannelKey, len: usize },
}
