use thiserror::Error;

use framer::{codec::CodecError, config::ConfigError};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("config error `{0}`")]
    Config(#[from] ConfigError),
    #[error("IO error `{0}`")]
    Io(#[from] std::io::Error),
    #[error("codec error `{0}`")]
    Codec(#[from] CodecError),
    #[error("json encoding error `{0}`")]
    JsonEncoding(#[from] serde_json::Error),
    #[error("empty frame file")]
    EmptyFile,
}
