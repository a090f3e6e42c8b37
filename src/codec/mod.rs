//! Compact binary encoding for frames.
//!
//! ```text
//! +-------+--------------+---------------------+------------------------------+
//! | flags | count: u32?  | start, end: i64 x2? | series...                    |
//! +-------+--------------+---------------------+------------------------------+
//! series: [key: u32]? [count: u32]? samples (count * density) [start, end: i64 x2]?
//! ```
//! All integers are little-endian. Shared header fields are present only when the
//! matching flag is set; per-series fields only when it is clear.

pub mod error;
pub mod flags;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::{
    channel::{Channel, ChannelKey},
    frame::Frame,
    telem::{DataType, Series, TimeRange, TimeStamp},
};

pub use error::CodecError;
pub use flags::Flags;

const FLAGS_SIZE: usize = 1;
const KEY_SIZE: usize = 4;
const COUNT_SIZE: usize = 4;
const TIME_RANGE_SIZE: usize = 16;

/// Encoder/decoder bound to a fixed set of channels. Both sides must be built
/// from the same `(keys, data types)` configuration.
#[derive(Debug, Clone)]
pub struct Codec {
    /// sorted ascending, unique
    keys: Vec<ChannelKey>,
    /// parallel to `keys`
    data_types: Vec<DataType>,
}

/// Header fields shared by every series in a frame
#[derive(Debug, Default)]
struct Shared {
    count: Option<u32>,
    range: Option<TimeRange>,
}

impl Codec {
    pub fn new(keys: Vec<ChannelKey>, data_types: Vec<DataType>) -> Result<Self, CodecError> {
        if keys.len() != data_types.len() {
            return Err(CodecError::ConfigMismatch {
                keys: keys.len(),
                data_types: data_types.len(),
            });
        }
        let mut pairs: Vec<_> = keys.into_iter().zip(data_types).collect();
        pairs.sort_by_key(|(k, _)| *k);
        pairs.dedup_by_key(|(k, _)| *k);
        let (keys, data_types) = pairs.into_iter().unzip();
        Ok(Self { keys, data_types })
    }

    pub fn from_channels(channels: &[Channel]) -> Self {
        let mut pairs: Vec<_> = channels.iter().map(|ch| (ch.key, ch.data_type)).collect();
        pairs.sort_by_key(|(k, _)| *k);
        pairs.dedup_by_key(|(k, _)| *k);
        let (keys, data_types) = pairs.into_iter().unzip();
        Self { keys, data_types }
    }

    /// Configured keys in canonical order
    pub fn keys(&self) -> &[ChannelKey] {
        &self.keys
    }

    pub fn data_type(&self, key: ChannelKey) -> Option<DataType> {
        self.position(key).map(|i| self.data_types[i])
    }

    fn position(&self, key: ChannelKey) -> Option<usize> {
        self.keys.binary_search(&key).ok()
    }

    pub fn encode(&self, frame: &Frame) -> Result<Bytes, CodecError> {
        let mut ordered = Vec::with_capacity(frame.len());
        for (key, series) in frame.iter() {
            let pos = self
                .position(key)
                .ok_or(CodecError::UnknownChannel(key))?;
            let expected = self.data_types[pos];
            if series.data_type() != expected {
                return Err(CodecError::DataTypeMismatch {
                    key,
                    expected,
                    actual: series.data_type(),
                });
            }
            let count = u32::try_from(series.len()).map_err(|_| CodecError::SeriesTooLarge {
                key,
                len: series.len(),
            })?;
            ordered.push((pos, key, count, series));
        }
        // stable, so repeated keys keep their push order
        ordered.sort_by_key(|(pos, ..)| *pos);

        let first = ordered.first();
        let flags = Flags {
            size: first.is_some_and(|(_, _, c0, _)| ordered.iter().all(|(_, _, c, _)| c == c0)),
            align: first.is_some_and(|(.., s0)| {
                ordered
                    .iter()
                    .all(|(.., s)| s.time_range() == s0.time_range())
            }),
            channel: ordered.len() == self.keys.len()
                && ordered.iter().zip(&self.keys).all(|((_, k, ..), ck)| k == ck),
        };

        let mut size = FLAGS_SIZE;
        if flags.size {
            size += COUNT_SIZE;
        }
        if flags.align {
            size += TIME_RANGE_SIZE;
        }
        for (.., series) in &ordered {
            size += series.byte_size();
            if !flags.channel {
                size += KEY_SIZE;
            }
            if !flags.size {
                size += COUNT_SIZE;
            }
            if !flags.align {
                size += TIME_RANGE_SIZE;
            }
        }

        let mut dst = BytesMut::with_capacity(size);
        dst.put_u8(flags.encode());
        if let Some((_, _, count, series)) = first {
            if flags.size {
                dst.put_u32_le(*count);
            }
            if flags.align {
                put_time_range(&mut dst, series.time_range());
            }
        }
        for (_, key, count, series) in &ordered {
            if !flags.channel {
                dst.put_u32_le(*key);
            }
            if !flags.size {
                dst.put_u32_le(*count);
            }
            dst.put_slice(series.data());
            if !flags.align {
                put_time_range(&mut dst, series.time_range());
            }
        }
        Ok(dst.freeze())
    }

    pub fn decode(&self, src: impl Into<Bytes>) -> Result<Frame, CodecError> {
        let mut src: Bytes = src.into();
        let flags = Flags::decode(take_u8(&mut src)?);
        let mut shared = Shared::default();
        if flags.size {
            shared.count = Some(take_u32(&mut src)?);
        }
        if flags.align {
            shared.range = Some(take_time_range(&mut src)?);
        }

        let mut frame = Frame::new();
        if flags.channel {
            for (key, dt) in self.keys.iter().zip(&self.data_types) {
                frame.push(*key, decode_series(&mut src, &shared, *dt)?);
            }
            if src.has_remaining() {
                return Err(CodecError::Protocol(format!(
                    "{} trailing bytes after last series",
                    src.remaining()
                )));
            }
            return Ok(frame);
        }

        // Keys arrive in canonical order. Configured keys absent from the frame are
        // skipped; a key may repeat when a channel carries several series. A key
        // behind the cursor is consumed and dropped.
        let mut pos = 0;
        while src.has_remaining() {
            let key = take_u32(&mut src)?;
            let dt = self.data_type(key).ok_or(CodecError::UnknownChannel(key))?;
            let series = decode_series(&mut src, &shared, dt)?;
            match self.keys[pos..].iter().position(|k| *k == key) {
                Some(offset) => {
                    pos += offset;
                    frame.push(key, series);
                }
                None => warn!(key, "dropping series for channel out of canonical order"),
            }
        }
        Ok(frame)
    }
}

fn decode_series(src: &mut Bytes, shared: &Shared, dt: DataType) -> Result<Series, CodecError> {
    let count = match shared.count {
        Some(c) => c,
        None => take_u32(src)?,
    };
    let size = (count as usize)
        .checked_mul(dt.density())
        .ok_or_else(|| CodecError::Protocol(format!("sample count {count} overflows")))?;
    let data = take_bytes(src, size)?;
    let range = match shared.range {
        Some(r) => r,
        None => take_time_range(src)?,
    };
    Series::new(dt, data, range).map_err(|e| CodecError::Protocol(e.to_string()))
}

fn put_time_range(dst: &mut BytesMut, tr: TimeRange) {
    dst.put_i64_le(tr.start.0);
    dst.put_i64_le(tr.end.0);
}

fn ensure(src: &Bytes, n: usize) -> Result<(), CodecError> {
    if src.remaining() < n {
        return Err(CodecError::Protocol(format!(
            "truncated buffer: needed {n} bytes, {} remaining",
            src.remaining()
        )));
    }
    Ok(())
}

fn take_u8(src: &mut Bytes) -> Result<u8, CodecError> {
    ensure(src, 1)?;
    Ok(src.get_u8())
}

fn take_u32(src: &mut Bytes) -> Result<u32, CodecError> {
    ensure(src, 4)?;
    Ok(src.get_u32_le())
}

fn take_time_range(src: &mut Bytes) -> Result<TimeRange, CodecError> {
    ensure(src, TIME_RANGE_SIZE)?;
    let start = TimeStamp(src.get_i64_le());
    let end = TimeStamp(src.get_i64_le());
    Ok(TimeRange { start, end })
}

fn take_bytes(src: &mut Bytes, n: usize) -> Result<Bytes, CodecError> {
    ensure(src, n)?;
    Ok(src.split_to(n))
}
