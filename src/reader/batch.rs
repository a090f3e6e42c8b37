use std::{collections::BTreeSet, sync::Arc, time::Duration};

use futures_util::future::join_all;
use tokio::{
    sync::{mpsc, oneshot},
    time::{Instant, sleep},
};
use tracing::{debug, error, info, warn};

use super::{
    RemoteReader,
    error::{FetchError, ReadError},
};
use crate::{
    cache::CacheManager,
    channel::ChannelKey,
    frame::Frame,
    telem::{Alignment, Series, TimeRange, TimeSpan},
};

pub type FetchResult = Result<(), ReadError>;

/// One caller's gap, sent to the executor
#[derive(Debug)]
pub struct FetchRequest {
    pub range: TimeRange,
    pub keys: Vec<ChannelKey>,
    pub done: oneshot::Sender<FetchResult>,
}

/// A coalesced gap awaiting a remote fetch. Every waiter receives the same outcome.
#[derive(Debug)]
pub struct PendingFetch {
    pub range: TimeRange,
    pub keys: BTreeSet<ChannelKey>,
    /// bounds of each gap folded in, as requested
    members: Vec<TimeRange>,
    waiters: Vec<oneshot::Sender<FetchResult>>,
}

impl PendingFetch {
    fn absorb(&mut self, other: PendingFetch) {
        self.range = self.range.union(&other.range);
        self.keys.extend(other.keys);
        self.members.extend(other.members);
        self.waiters.extend(other.waiters);
    }

    /// True when `range` lies within `tolerance` of every gap already folded in
    fn accepts(&self, range: &TimeRange, tolerance: u64) -> bool {
        self.members.iter().all(|m| {
            m.start.abs_diff(range.start) <= tolerance && m.end.abs_diff(range.end) <= tolerance
        })
    }

    fn resolve(self, res: FetchResult) {
        for waiter in self.waiters {
            // caller may have gone away
            let _ = waiter.send(res.clone());
        }
    }
}

/// Pending fetches of one debounce window, grouped by exact bounds
#[derive(Debug, Default)]
pub struct PendingTable {
    fetches: Vec<PendingFetch>,
}

impl PendingTable {
    pub fn add(&mut self, req: FetchRequest) {
        match self.fetches.iter_mut().find(|f| f.range == req.range) {
            Some(fetch) => {
                fetch.keys.extend(req.keys);
                fetch.waiters.push(req.done);
            }
            None => self.fetches.push(PendingFetch {
                range: req.range,
                keys: req.keys.into_iter().collect(),
                members: vec![req.range],
                waiters: vec![req.done],
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.fetches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetches.is_empty()
    }

    /// Folds fetches whose starts and ends each differ by at most `tolerance` from
    /// every gap of a group into one fetch over the union of their ranges and
    /// channels. Groups are built in order of start time.
    pub fn merge(mut self, tolerance: TimeSpan) -> Vec<PendingFetch> {
        let tol = tolerance.abs();
        self.fetches.sort_by_key(|f| (f.range.start, f.range.end));
        let mut merged: Vec<PendingFetch> = Vec::with_capacity(self.fetches.len());
        for fetch in self.fetches {
            let near = merged.iter_mut().find(|m| m.accepts(&fetch.range, tol));
            match near {
                Some(m) => m.absorb(fetch),
                None => merged.push(fetch),
            }
        }
        merged
    }
}

/// Single consumer of the pending fetch queue
pub struct BatchExecutor {
    rx: mpsc::Receiver<FetchRequest>,
    remote: Arc<dyn RemoteReader>,
    caches: Arc<CacheManager>,
    debounce: Duration,
    tolerance: TimeSpan,
}

impl BatchExecutor {
    pub fn new(
        rx: mpsc::Receiver<FetchRequest>,
        remote: Arc<dyn RemoteReader>,
        caches: Arc<CacheManager>,
        debounce: Duration,
        tolerance: TimeSpan,
    ) -> Self {
        Self {
            rx,
            remote,
            caches,
            debounce,
            tolerance,
        }
    }

    pub async fn run(mut self) {
        info!("running");
        while let Some(first) = self.rx.recv().await {
            let mut table = PendingTable::default();
            table.add(first);
            let closed = self.collect(&mut table).await;
            self.execute(table).await;
            if closed {
                break;
            }
        }
        info!("stopped");
    }

    /// Adds requests to `table` until a full debounce window passes without one.
    /// Returns true if the queue closed meanwhile.
    async fn collect(&mut self, table: &mut PendingTable) -> bool {
        let timer = sleep(self.debounce);
        tokio::pin!(timer);
        loop {
            tokio::select! {
                req = self.rx.recv() => match req {
                    Some(req) => {
                        table.add(req);
                        timer.as_mut().reset(Instant::now() + self.debounce);
                    }
                    None => return true,
                },
                _ = &mut timer => return false,
            }
        }
    }

    async fn execute(&self, table: PendingTable) {
        let pending = table.len();
        let fetches = table.merge(self.tolerance);
        debug!(pending, merged = fetches.len(), "executing batch");
        join_all(fetches.into_iter().map(|f| self.fetch(f))).await;
    }

    async fn fetch(&self, fetch: PendingFetch) {
        let keys: Vec<ChannelKey> = fetch.keys.iter().copied().collect();
        let res = match self.remote.read(fetch.range, &keys).await {
            Ok(frame) => self.write(&keys, frame).await,
            Err(e) => {
                error!("fetching {keys:?} over {}: {e}", fetch.range);
                Err(ReadError::Fetch(FetchError {
                    range: fetch.range,
                    keys,
                    message: e.to_string(),
                }))
            }
        };
        fetch.resolve(res);
    }

    async fn write(&self, keys: &[ChannelKey], frame: Frame) -> FetchResult {
        for key in frame.keys() {
            if !keys.contains(&key) {
                warn!(key, "discarding data for unrequested channel");
            }
        }
        for key in keys {
            let series: Vec<Series> = frame.get(*key).into_iter().map(place).collect();
            if series.is_empty() {
                continue;
            }
            self.caches.write(*key, series).await?;
        }
        Ok(())
    }
}

/// Series decoded off the wire carry no alignment. They are placed by their start
/// time so they order and separate in the cache the way their time ranges do.
fn place(series: &Series) -> Series {
    match series.alignment() == Alignment::default() {
        true => series
            .clone()
            .with_alignment(Alignment::from_time(series.time_range().start)),
        false => series.clone(),
    }
}
