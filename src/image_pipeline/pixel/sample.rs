//! Scalar sample types that can be streamed to disk

use std::fmt::Debug;

use crate::image_pipeline::common::error::{PipelineError, Result};

/// On-disk tag of a sample type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    U8,
    U16,
    F32,
}

impl PixelType {
    /// Bytes per sample
    pub fn size(self) -> usize {
        match self {
            PixelType::U8 => 1,
            PixelType::U16 => 2,
            PixelType::F32 => 4,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            PixelType::U8 => 1,
            PixelType::U16 => 2,
            PixelType::F32 => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(PixelType::U8),
            2 => Ok(PixelType::U16),
            3 => Ok(PixelType::F32),
            other => Err(PipelineError::UnsupportedFormat(format!("pixel type tag {other}"))),
        }
    }
}

/// A scalar pixel component.
pub trait Sample: Copy + Default + PartialEq + Debug + Send + Sync + 'static {
    const PIXEL_TYPE: PixelType;

    fn to_f64(self) -> f64;

    /// Appends the little-endian bytes of every sample in `samples`.
    fn extend_le(samples: &[Self], out: &mut Vec<u8>);

    /// Decodes one sample from exactly `PIXEL_TYPE.size()` bytes.
    fn from_le(bytes: &[u8]) -> Self;

    fn decode_le(bytes: &[u8]) -> Vec<Self> {
        bytes
            .chunks_exact(Self::PIXEL_TYPE.size())
            .map(Self::from_le)
            .collect()
    }
}

macro_rules! impl_sample {
    ($ty:ty, $pixel_type:expr, $width:expr) => {
        impl Sample for $ty {
            const PIXEL_TYPE: PixelType = $pixel_type;

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn extend_le(samples: &[Self], out: &mut Vec<u8>) {
                out.reserve(samples.len() * $width);
                for s in samples {
                    out.extend_from_slice(&s.to_le_bytes());
                }
            }

            fn from_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; $width];
                raw.copy_from_slice(&bytes[..$width]);
                <$ty>::from_le_bytes(raw)
            }
        }
    };
}

impl_sample!(u8, PixelType::U8, 1);
impl_sample!(u16, PixelType::U16, 2);
impl_sample!(f32, PixelType::F32, 4);
