pub mod cache;
pub mod channel;
pub mod codec;
pub mod config;
pub mod frame;
pub mod reader;
pub mod telem;

pub use cache::{CacheManager, StaticCache};
pub use channel::{Channel, ChannelKey, ChannelRetriever};
pub use codec::Codec;
pub use config::FramerConfig;
pub use frame::Frame;
pub use reader::{ReadError, Reader, RemoteReader, Response};
pub use telem::{Alignment, DataType, Series, TimeRange, TimeSpan, TimeStamp};
