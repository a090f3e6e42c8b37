pub mod batch;
pub mod error;

use std::{
    collections::HashMap,
    error::Error,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{Instrument, Level, debug, span};

use crate::{
    cache::{CacheManager, GcResult},
    channel::{Channel, ChannelKey, ChannelRetriever},
    config::FramerConfig,
    frame::Frame,
    telem::{AlignmentBounds, Series, TimeRange},
};

use batch::{BatchExecutor, FetchRequest};
pub use error::{FetchError, ReadError};

pub type RemoteError = Box<dyn Error + Send + Sync>;

/// Fetches channel data the caches don't hold
#[async_trait]
pub trait RemoteReader: Send + Sync {
    async fn read(&self, range: TimeRange, keys: &[ChannelKey]) -> Result<Frame, RemoteError>;
}

/// A channel's cached series covering a read.
/// Series may extend past the requested range.
#[derive(Debug, Clone)]
pub struct Response {
    pub channel: Channel,
    pub series: Vec<Arc<Series>>,
}

impl Response {
    pub fn time_range(&self) -> TimeRange {
        match (self.series.first(), self.series.last()) {
            (Some(first), Some(last)) => TimeRange {
                start: first.time_range().start,
                end: last.time_range().end,
            },
            _ => TimeRange::ZERO,
        }
    }

    pub fn alignment_bounds(&self) -> AlignmentBounds {
        match (self.series.first(), self.series.last()) {
            (Some(first), Some(last)) => AlignmentBounds {
                lower: first.alignment_bounds().lower,
                upper: last.alignment_bounds().upper,
            },
            _ => AlignmentBounds::default(),
        }
    }

    /// Total samples across all series
    pub fn len(&self) -> usize {
        self.series.iter().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Serves time range reads out of per-channel caches, fetching gaps through a
/// debounced batch executor
pub struct Reader {
    channels: Arc<dyn ChannelRetriever>,
    caches: Arc<CacheManager>,
    batch_tx: mpsc::Sender<FetchRequest>,
    executor: JoinHandle<()>,
    closed: AtomicBool,
}

impl Reader {
    /// Spawns the batch executor on the current runtime
    pub fn new(
        config: &FramerConfig,
        channels: Arc<dyn ChannelRetriever>,
        remote: Arc<dyn RemoteReader>,
    ) -> Self {
        let caches = Arc::new(CacheManager::new(&config.cache));
        let (batch_tx, batch_rx) = mpsc::channel(config.reader.queue_size.max(1));
        let executor = BatchExecutor::new(
            batch_rx,
            remote,
            caches.clone(),
            config.reader.debounce(),
            config.reader.merge_tolerance(),
        );
        let span = span!(Level::INFO, "BatchExecutor");
        let executor = tokio::spawn(executor.run().instrument(span));

        Self {
            channels,
            caches,
            batch_tx,
            executor,
            closed: AtomicBool::new(false),
        }
    }

    pub fn caches(&self) -> &Arc<CacheManager> {
        &self.caches
    }

    pub async fn read(
        &self,
        range: TimeRange,
        keys: &[ChannelKey],
    ) -> Result<HashMap<ChannelKey, Response>, ReadError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ReadError::Closed);
        }
        if !range.is_valid() {
            return Err(ReadError::InvalidRange(range));
        }

        let mut keys = keys.to_vec();
        keys.sort_unstable();
        keys.dedup();

        let mut caches = Vec::with_capacity(keys.len());
        for channel in self.channels.retrieve(&keys).await? {
            let cache = self.caches.get_or_create(&channel).await;
            caches.push((channel, cache));
        }

        // gap -> channels missing it
        let mut gaps: HashMap<TimeRange, Vec<ChannelKey>> = HashMap::new();
        for (channel, cache) in &caches {
            let read = cache.read().await.dirty_read(range);
            if read.gaps.is_empty() {
                debug!(key = channel.key, "cache hit over {range}");
            }
            for gap in read.gaps {
                gaps.entry(gap).or_default().push(channel.key);
            }
        }

        if !gaps.is_empty() {
            self.fetch(gaps).await?;
        }

        let mut res = HashMap::with_capacity(caches.len());
        for (channel, cache) in caches {
            let series = cache.read().await.dirty_read(range).series;
            res.insert(channel.key, Response { channel, series });
        }
        Ok(res)
    }

    async fn fetch(&self, gaps: HashMap<TimeRange, Vec<ChannelKey>>) -> Result<(), ReadError> {
        let mut pending = Vec::with_capacity(gaps.len());
        for (range, keys) in gaps {
            let (done, rx) = oneshot::channel();
            self.batch_tx
                .send(FetchRequest { range, keys, done })
                .await
                .map_err(|_| ReadError::Closed)?;
            pending.push(rx);
        }

        for res in join_all(pending).await {
            res.map_err(|_| ReadError::Closed)??;
        }
        Ok(())
    }

    pub async fn gc(&self) -> GcResult {
        self.caches.gc().await
    }

    /// Stops the executor and drops every cache. Reads still waiting on a fetch fail
    /// with [`ReadError::Closed`].
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.executor.abort();
        self.caches.close().await;
    }
}
