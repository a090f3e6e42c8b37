use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::{Alignment, AlignmentBounds, DataType, TimeRange, TimeStamp};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SeriesError {
    #[error("buffer of {size} bytes is not a whole number of {data_type} samples")]
    Misaligned { size: usize, data_type: DataType },
    #[error("slice [{start}, {end}) out of bounds for series of length {len}")]
    OutOfBounds { start: usize, end: usize, len: usize },
}

/// Native types that can be stored in a [`Series`]
pub trait Sample: Copy {
    const DATA_TYPE: DataType;

    fn put(self, dst: &mut BytesMut);

    /// `src` is exactly `DATA_TYPE.density()` bytes
    fn read(src: &[u8]) -> Self;
}

macro_rules! impl_sample {
    ($t:ty, $dt:expr, $put:ident, $get:ident) => {
        impl Sample for $t {
            const DATA_TYPE: DataType = $dt;

            fn put(self, dst: &mut BytesMut) {
                dst.$put(self);
            }

            fn read(mut src: &[u8]) -> Self {
                src.$get()
            }
        }
    };
}

impl_sample!(f64, DataType::Float64, put_f64_le, get_f64_le);
impl_sample!(f32, DataType::Float32, put_f32_le, get_f32_le);
impl_sample!(i64, DataType::Int64, put_i64_le, get_i64_le);
impl_sample!(i32, DataType::Int32, put_i32_le, get_i32_le);
impl_sample!(i16, DataType::Int16, put_i16_le, get_i16_le);
impl_sample!(i8, DataType::Int8, put_i8, get_i8);
impl_sample!(u64, DataType::Uint64, put_u64_le, get_u64_le);
impl_sample!(u32, DataType::Uint32, put_u32_le, get_u32_le);
impl_sample!(u16, DataType::Uint16, put_u16_le, get_u16_le);
impl_sample!(u8, DataType::Uint8, put_u8, get_u8);
impl_sample!(u128, DataType::Uuid, put_u128_le, get_u128_le);

impl Sample for TimeStamp {
    const DATA_TYPE: DataType = DataType::TimeStamp;

    fn put(self, dst: &mut BytesMut) {
        dst.put_i64_le(self.0);
    }

    fn read(mut src: &[u8]) -> Self {
        TimeStamp(src.get_i64_le())
    }
}

/// Immutable, single-typed, time-ordered array of samples.
///
/// Cloning is cheap: the underlying buffer is reference counted and slices
/// share it.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    data_type: DataType,
    data: Bytes,
    time_range: TimeRange,
    alignment: Alignment,
}

impl Series {
    pub fn new(
        data_type: DataType,
        data: impl Into<Bytes>,
        time_range: TimeRange,
    ) -> Result<Self, SeriesError> {
        let data = data.into();
        if data.len() % data_type.density() != 0 {
            return Err(SeriesError::Misaligned {
                size: data.len(),
                data_type,
            });
        }
        Ok(Self {
            data_type,
            data,
            time_range,
            alignment: Alignment::default(),
        })
    }

    pub fn from_values<T: Sample>(values: &[T], time_range: TimeRange) -> Self {
        let mut buf = BytesMut::with_capacity(values.len() * T::DATA_TYPE.density());
        for v in values {
            v.put(&mut buf);
        }
        Self {
            data_type: T::DATA_TYPE,
            data: buf.freeze(),
            time_range,
            alignment: Alignment::default(),
        }
    }

    pub fn with_alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = time_range;
        self
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn time_range(&self) -> TimeRange {
        self.time_range
    }

    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.data.len() / self.data_type.density()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn byte_size(&self) -> usize {
        self.data.len()
    }

    pub fn alignment_bounds(&self) -> AlignmentBounds {
        AlignmentBounds {
            lower: self.alignment,
            upper: self.alignment.add_samples(self.len() as u64),
        }
    }

    /// Value at sample `i`, or `None` if out of bounds or of the wrong type
    pub fn at<T: Sample>(&self, i: usize) -> Option<T> {
        if T::DATA_TYPE != self.data_type || i >= self.len() {
            return None;
        }
        let d = self.data_type.density();
        Some(T::read(&self.data[i * d..(i + 1) * d]))
    }

    pub fn values<T: Sample>(&self) -> Option<Vec<T>> {
        if T::DATA_TYPE != self.data_type {
            return None;
        }
        Some(
            self.data
                .chunks_exact(self.data_type.density())
                .map(T::read)
                .collect(),
        )
    }

    /// Zero-copy sub-series over samples `[start, end)`. The alignment advances by
    /// `start`; the time range is kept and may be narrowed with
    /// [`Series::with_time_range`].
    pub fn slice(&self, start: usize, end: usize) -> Result<Series, SeriesError> {
        let len = self.len();
        if start > end || end > len {
            return Err(SeriesError::OutOfBounds { start, end, len });
        }
        let d = self.data_type.density();
        Ok(Series {
            data_type: self.data_type,
            data: self.data.slice(start * d..end * d),
            time_range: self.time_range,
            alignment: self.alignment.add_samples(start as u64),
        })
    }
}
