use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::telem::DataType;

pub type ChannelKey = u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub key: ChannelKey,
    pub name: String,
    pub data_type: DataType,
    /// key of the channel holding this channel's timestamps
    #[serde(default)]
    pub index: Option<ChannelKey>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChannelError {
    #[error("unknown channel `{0}`")]
    Unknown(ChannelKey),
    #[error("channel retrieval failed: {0}")]
    Retrieve(String),
}

/// Resolves channel keys to their metadata
#[async_trait]
pub trait ChannelRetriever: Send + Sync {
    async fn retrieve(&self, keys: &[ChannelKey]) -> Result<Vec<Channel>, ChannelError>;
}

/// In-memory retriever over a fixed channel list
#[derive(Debug, Default, Clone)]
pub struct StaticChannels {
    channels: HashMap<ChannelKey, Channel>,
}

impl StaticChannels {
    pub fn new(channels: impl IntoIterator<Item = Channel>) -> Self {
        Self {
            channels: channels.into_iter().map(|ch| (ch.key, ch)).collect(),
        }
    }

    pub fn get(&self, key: ChannelKey) -> Option<&Channel> {
        self.channels.get(&key)
    }

    pub fn insert(&mut self, channel: Channel) {
        self.channels.insert(channel.key, channel);
    }
}

#[async_trait]
impl ChannelRetriever for StaticChannels {
    async fn retrieve(&self, keys: &[ChannelKey]) -> Result<Vec<Channel>, ChannelError> {
        keys.iter()
            .map(|key| self.get(*key).cloned().ok_or(ChannelError::Unknown(*key)))
            .collect()
    }
}
