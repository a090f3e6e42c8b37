use std::{fmt, ops::Add, time::Duration};

use serde::{Deserialize, Serialize};

mod series;

pub use series::{Sample, Series, SeriesError};

/// Nanoseconds since the unix epoch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeStamp(pub i64);

/// Signed nanosecond span
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeSpan(pub i64);

impl TimeStamp {
    pub const ZERO: Self = Self(0);
    pub const MIN: Self = Self(i64::MIN);
    pub const MAX: Self = Self(i64::MAX);

    pub fn now() -> Self {
        let ns = jiff::Timestamp::now().as_nanosecond();
        Self(i64::try_from(ns).unwrap_or(i64::MAX))
    }

    pub fn span(self, other: TimeStamp) -> TimeSpan {
        TimeSpan(other.0.saturating_sub(self.0))
    }

    pub fn abs_diff(self, other: TimeStamp) -> u64 {
        self.0.abs_diff(other.0)
    }
}

impl Add<TimeSpan> for TimeStamp {
    type Output = TimeStamp;

    fn add(self, rhs: TimeSpan) -> Self::Output {
        TimeStamp(self.0.saturating_add(rhs.0))
    }
}

impl From<i64> for TimeStamp {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match jiff::Timestamp::from_nanosecond(self.0 as i128) {
            Ok(ts) => write!(f, "{ts}"),
            Err(_) => write!(f, "{}ns", self.0),
        }
    }
}

impl TimeSpan {
    pub const ZERO: Self = Self(0);

    pub const fn nanoseconds(ns: i64) -> Self {
        Self(ns)
    }

    pub const fn milliseconds(ms: i64) -> Self {
        Self(ms * 1_000_000)
    }

    pub const fn seconds(s: i64) -> Self {
        Self(s * 1_000_000_000)
    }

    pub fn abs(self) -> u64 {
        self.0.unsigned_abs()
    }
}

impl From<Duration> for TimeSpan {
    fn from(value: Duration) -> Self {
        Self(i64::try_from(value.as_nanos()).unwrap_or(i64::MAX))
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// End-exclusive range `[start, end)`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: TimeStamp,
    pub end: TimeStamp,
}

impl TimeRange {
    pub const ZERO: Self = Self {
        start: TimeStamp::ZERO,
        end: TimeStamp::ZERO,
    };

    pub fn new(start: impl Into<TimeStamp>, end: impl Into<TimeStamp>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    pub fn is_zero(&self) -> bool {
        self.start == self.end
    }

    pub fn span(&self) -> TimeSpan {
        self.start.span(self.end)
    }

    /// True when the two ranges share at least one nanosecond
    pub fn overlaps_with(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_stamp(&self, ts: TimeStamp) -> bool {
        self.start <= ts && ts < self.end
    }

    pub fn contains_range(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Smallest range covering both
    pub fn union(&self, other: &TimeRange) -> TimeRange {
        TimeRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Clamps this range so it lies within `bound`
    pub fn bound(&self, bound: &TimeRange) -> TimeRange {
        let start = self.start.clamp(bound.start, bound.end);
        let end = self.end.clamp(start, bound.end);
        TimeRange { start, end }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.0, self.end.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Float64,
    Float32,
    Int64,
    Int32,
    Int16,
    Int8,
    Uint64,
    Uint32,
    Uint16,
    Uint8,
    TimeStamp,
    Uuid,
}

impl DataType {
    /// Bytes per sample
    pub const fn density(self) -> usize {
        match self {
            Self::Float64 | Self::Int64 | Self::Uint64 | Self::TimeStamp => 8,
            Self::Float32 | Self::Int32 | Self::Uint32 => 4,
            Self::Int16 | Self::Uint16 => 2,
            Self::Int8 | Self::Uint8 => 1,
            Self::Uuid => 16,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Float64 => "float64",
            Self::Float32 => "float32",
            Self::Int64 => "int64",
            Self::Int32 => "int32",
            Self::Int16 => "int16",
            Self::Int8 => "int8",
            Self::Uint64 => "uint64",
            Self::Uint32 => "uint32",
            Self::Uint16 => "uint16",
            Self::Uint8 => "uint8",
            Self::TimeStamp => "timestamp",
            Self::Uuid => "uuid",
        };
        f.write_str(s)
    }
}

/// Logical sample position, independent of wall-clock time.
/// Upper 32 bits are the domain index, lower 32 bits the sample index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Alignment(pub u64);

impl Alignment {
    pub const fn new(domain: u32, sample: u32) -> Self {
        Self(((domain as u64) << 32) | sample as u64)
    }

    pub const fn domain_index(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub const fn sample_index(self) -> u32 {
        self.0 as u32
    }

    pub const fn add_samples(self, n: u64) -> Self {
        Self(self.0.saturating_add(n))
    }

    /// Position ordered like `ts`, for series that arrive without alignment. Two
    /// series with time-disjoint ranges and at most one sample per nanosecond
    /// never overlap under it.
    pub const fn from_time(ts: TimeStamp) -> Self {
        Self((ts.0 as u64) ^ (1 << 63))
    }
}

/// End-exclusive alignment range `[lower, upper)`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AlignmentBounds {
    pub lower: Alignment,
    pub upper: Alignment,
}

impl AlignmentBounds {
    pub fn is_empty(&self) -> bool {
        self.lower >= self.upper
    }

    pub fn overlaps_with(&self, other: &AlignmentBounds) -> bool {
        self.lower < other.upper && other.lower < self.upper
    }

    pub fn contains(&self, other: &AlignmentBounds) -> bool {
        self.lower <= other.lower && other.upper <= self.upper
    }
}

impl fmt::Display for AlignmentBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.lower.0, self.upper.0)
    }
}
