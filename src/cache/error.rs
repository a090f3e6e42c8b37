use thiserror::Error;

use crate::{
    channel::ChannelKey,
    telem::{AlignmentBounds, DataType, SeriesError, TimeRange},
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    /// Two entries overlap. This means the merge logic is broken and the cache can
    /// no longer be trusted, so it is never corrected in place.
    #[error("cache integrity violated for channel `{key}`: entry {prev} overlaps entry {next}")]
    Integrity {
        key: ChannelKey,
        prev: AlignmentBounds,
        next: AlignmentBounds,
    },
    /// The series claims alignment the cache already holds for a different time range
    #[error("misaligned series {alignment} over {time_range} for channel `{key}`")]
    Misaligned {
        key: ChannelKey,
        alignment: AlignmentBounds,
        time_range: TimeRange,
    },
    #[error("no cache for channel `{0}`")]
    UnknownChannel(ChannelKey),
    #[error("channel `{key}` holds {expected} but series is {actual}")]
    DataTypeMismatch {
        key: ChannelKey,
        expected: DataType,
        actual: DataType,
    },
    #[error("series error `{0}`")]
    Series(#[from] SeriesError),
}
