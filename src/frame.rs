use thiserror::Error;

use crate::{
    channel::ChannelKey,
    telem::{Series, TimeRange},
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    #[error("frame has {keys} keys but {series} series")]
    LengthMismatch { keys: usize, series: usize },
}

/// Ordered association of channel key -> series. A key may appear more than once,
/// in which case its series are kept in push order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    keys: Vec<ChannelKey>,
    series: Vec<Series>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_series(key: ChannelKey, series: Series) -> Self {
        Self {
            keys: vec![key],
            series: vec![series],
        }
    }

    pub fn from_parts(keys: Vec<ChannelKey>, series: Vec<Series>) -> Result<Self, FrameError> {
        if keys.len() != series.len() {
            return Err(FrameError::LengthMismatch {
                keys: keys.len(),
                series: series.len(),
            });
        }
        Ok(Self { keys, series })
    }

    pub fn into_parts(self) -> (Vec<ChannelKey>, Vec<Series>) {
        (self.keys, self.series)
    }

    /// Number of series (not unique keys)
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChannelKey, &Series)> {
        self.keys.iter().copied().zip(self.series.iter())
    }

    pub fn contains(&self, key: ChannelKey) -> bool {
        self.keys.contains(&key)
    }

    /// Unique keys in order of first appearance
    pub fn keys(&self) -> Vec<ChannelKey> {
        let mut keys = Vec::with_capacity(self.keys.len());
        for key in &self.keys {
            if !keys.contains(key) {
                keys.push(*key);
            }
        }
        keys
    }

    pub fn get(&self, key: ChannelKey) -> Vec<&Series> {
        self.iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, s)| s)
            .collect()
    }

    pub fn push(&mut self, key: ChannelKey, series: Series) {
        self.keys.push(key);
        self.series.push(series);
    }

    /// Appends series under `key`
    pub fn push_all(&mut self, key: ChannelKey, series: impl IntoIterator<Item = Series>) {
        for s in series {
            self.push(key, s);
        }
    }

    /// Replaces every series under `key`
    pub fn override_key(&mut self, key: ChannelKey, series: impl IntoIterator<Item = Series>) {
        self.remove_key(key);
        self.push_all(key, series);
    }

    /// Merges `other` in, keeping existing series on key collision
    pub fn push_frame(&mut self, other: Frame) {
        self.keys.extend(other.keys);
        self.series.extend(other.series);
    }

    /// Merges `other` in, replacing existing series on key collision
    pub fn override_frame(&mut self, other: Frame) {
        for key in other.keys() {
            self.remove_key(key);
        }
        self.push_frame(other);
    }

    /// Keeps only series whose key is in `keys`
    pub fn filter_keys(&self, keys: &[ChannelKey]) -> Frame {
        let (keys, series) = self
            .iter()
            .filter(|(k, _)| keys.contains(k))
            .map(|(k, s)| (k, s.clone()))
            .unzip();
        Frame { keys, series }
    }

    /// Min start / max end across all series
    pub fn time_range(&self) -> TimeRange {
        span_of(self.series.iter())
    }

    pub fn time_range_of(&self, key: ChannelKey) -> Option<TimeRange> {
        if !self.contains(key) {
            return None;
        }
        Some(span_of(self.get(key).into_iter()))
    }

    /// Exactly one series per key
    pub fn is_vertical(&self) -> bool {
        self.keys().len() == self.keys.len()
    }

    /// A single key
    pub fn is_horizontal(&self) -> bool {
        self.keys().len() == 1
    }

    /// Every key spans the same time range
    pub fn is_weakly_aligned(&self) -> bool {
        let mut ranges = self.keys().into_iter().filter_map(|k| self.time_range_of(k));
        match ranges.next() {
            Some(first) => ranges.all(|tr| tr == first),
            None => true,
        }
    }

    fn remove_key(&mut self, key: ChannelKey) {
        let mut i = 0;
        while i < self.keys.len() {
            if self.keys[i] == key {
                self.keys.remove(i);
                self.series.remove(i);
            } else {
                i += 1;
            }
        }
    }
}

fn span_of<'a>(mut series: impl Iterator<Item = &'a Series>) -> TimeRange {
    let Some(first) = series.next() else {
        return TimeRange::ZERO;
    };
    series.fold(first.time_range(), |acc, s| acc.union(&s.time_range()))
}
