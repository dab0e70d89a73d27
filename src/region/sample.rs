//! Pixel types and per-sample conversion.
//!
//! Decoders hand out raw bytes; the tile worker turns them into typed samples
//! through the [`Sample`] trait. The sample type of a read is chosen by the
//! caller and must match what the decoder reports.

use std::fmt::Debug;

use serde::Serialize;

/// Storage type of one sample as reported by a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl PixelType {
    /// Number of bytes one sample occupies in raw plane data.
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            PixelType::U8 | PixelType::I8 => 1,
            PixelType::U16 | PixelType::I16 => 2,
            PixelType::U32 | PixelType::I32 | PixelType::F32 => 4,
            PixelType::F64 => 8,
        }
    }

    /// Whether samples are floating point.
    pub const fn is_float(self) -> bool {
        matches!(self, PixelType::F32 | PixelType::F64)
    }
}

/// A typed sample that can be decoded from raw plane bytes and averaged.
pub trait Sample: Copy + Default + PartialEq + Debug + Send + Sync + 'static {
    /// The decoder pixel type this sample corresponds to.
    const PIXEL_TYPE: PixelType;

    /// Decode one sample from exactly `PIXEL_TYPE.bytes_per_sample()` bytes.
    fn from_bytes(bytes: &[u8], little_endian: bool) -> Self;

    fn to_f64(self) -> f64;

    /// Convert back from an averaged value. Integer types round to nearest
    /// and saturate at their bounds.
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_integer_sample {
    ($ty:ty, $pixel:expr, $len:expr) => {
        impl Sample for $ty {
            const PIXEL_TYPE: PixelType = $pixel;

            #[inline]
            fn from_bytes(bytes: &[u8], little_endian: bool) -> Self {
                let mut raw = [0u8; $len];
                raw.copy_from_slice(&bytes[..$len]);
                if little_endian {
                    <$ty>::from_le_bytes(raw)
                } else {
                    <$ty>::from_be_bytes(raw)
                }
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(value: f64) -> Self {
                value.round().clamp(<$ty>::MIN as f64, <$ty>::MAX as f64) as $ty
            }
        }
    };
}

macro_rules! impl_float_sample {
    ($ty:ty, $pixel:expr, $len:expr) => {
        impl Sample for $ty {
            const PIXEL_TYPE: PixelType = $pixel;

            #[inline]
            fn from_bytes(bytes: &[u8], little_endian: bool) -> Self {
                let mut raw = [0u8; $len];
                raw.copy_from_slice(&bytes[..$len]);
                if little_endian {
                    <$ty>::from_le_bytes(raw)
                } else {
                    <$ty>::from_be_bytes(raw)
                }
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(value: f64) -> Self {
                value as $ty
            }
        }
    };
}

impl_integer_sample!(u8, PixelType::U8, 1);
impl_integer_sample!(i8, PixelType::I8, 1);
impl_integer_sample!(u16, PixelType::U16, 2);
impl_integer_sample!(i16, PixelType::I16, 2);
impl_integer_sample!(u32, PixelType::U32, 4);
impl_integer_sample!(i32, PixelType::I32, 4);
impl_float_sample!(f32, PixelType::F32, 4);
impl_float_sample!(f64, PixelType::F64, 8);

/// Decode a run of raw bytes into typed samples.
///
/// `out` must hold exactly `raw.len() / bytes_per_sample` samples.
pub(crate) fn convert_samples<T: Sample>(raw: &[u8], little_endian: bool, out: &mut [T]) {
    let bps = T::PIXEL_TYPE.bytes_per_sample();
    for (sample, chunk) in out.iter_mut().zip(raw.chunks_exact(bps)) {
        *sample = T::from_bytes(chunk, little_endian);
    }
}
