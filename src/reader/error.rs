use thiserror::Error;

use crate::{
    cache::CacheError,
    channel::{ChannelError, ChannelKey},
    telem::TimeRange,
};

/// Remote fetch failure, shared by every caller folded into the failed fetch
#[derive(Error, Debug, Clone, PartialEq)]
#[error("remote fetch of {keys:?} over {range} failed: {message}")]
pub struct FetchError {
    pub range: TimeRange,
    pub keys: Vec<ChannelKey>,
    pub message: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadError {
    #[error("invalid time range {0}")]
    InvalidRange(TimeRange),
    #[error("channel error `{0}`")]
    Channel(#[from] ChannelError),
    #[error("{0}")]
    Fetch(#[from] FetchError),
    #[error("cache error `{0}`")]
    Cache(#[from] CacheError),
    #[error("reader closed")]
    Closed,
}
