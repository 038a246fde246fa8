//! TIFF output configuration types

use tiff::encoder::Compression;
use tiff::encoder::compression::DeflateLevel;
use tiff::tags::Predictor;

/// TIFF compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiffCompression {
    /// No compression (fastest, largest file)
    None,
    /// LZW compression (slow, good compression)
    Lzw,
    /// Deflate compression - fast level (good speed/size balance)
    DeflateFast,
    /// Deflate compression - best compression (slower)
    DeflateBest,
    /// Deflate compression - balanced
    DeflateBalanced,
}

impl TiffCompression {
    pub(crate) fn to_encoder(self) -> Compression {
        match self {
            TiffCompression::None => Compression::Uncompressed,
            TiffCompression::Lzw => Compression::Lzw,
            TiffCompression::DeflateFast => Compression::Deflate(DeflateLevel::Fast),
            TiffCompression::DeflateBalanced => Compression::Deflate(DeflateLevel::Balanced),
            TiffCompression::DeflateBest => Compression::Deflate(DeflateLevel::Best),
        }
    }
}

/// Configuration for TIFF stack output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffSinkConfig {
    /// Codec used when a write asks for compression
    pub compression: TiffCompression,
    /// Predictor value for compression (typically 2 for horizontal differencing)
    /// Only applied to integer samples
    pub predictor: Option<u16>,
}

impl Default for TiffSinkConfig {
    fn default() -> Self {
        Self {
            compression: TiffCompression::DeflateBalanced,
            predictor: None,
        }
    }
}

impl TiffSinkConfig {
    pub fn builder() -> TiffSinkConfigBuilder {
        TiffSinkConfigBuilder::default()
    }

    pub(crate) fn encoder_predictor(&self) -> Predictor {
        match self.predictor {
            Some(2) => Predictor::Horizontal,
            _ => Predictor::None,
        }
    }
}

/// Builder for TiffSinkConfig
#[derive(Default)]
pub struct TiffSinkConfigBuilder {
    compression: Option<TiffCompression>,
    predictor: Option<Option<u16>>,
}

impl TiffSinkConfigBuilder {
    pub fn compression(mut self, compression: TiffCompression) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn predictor(mut self, predictor: Option<u16>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    pub fn build(self) -> TiffSinkConfig {
        let default = TiffSinkConfig::default();
        TiffSinkConfig {
            compression: self.compression.unwrap_or(default.compression),
            predictor: self.predictor.unwrap_or(default.predictor),
        }
    }
}
