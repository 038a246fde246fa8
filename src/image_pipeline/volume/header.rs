//! Volume container header
//!
//! Layout, all integers little-endian:
//!
//! | bytes | field                                   |
//! |-------|-----------------------------------------|
//! | 6     | magic `RGNVOL`                          |
//! | 1     | version                                 |
//! | 1     | pixel type tag                          |
//! | 1     | components per pixel                    |
//! | 1     | number of dimensions `n`                |
//! | 1     | flags, bit 0 set when payload is zlib   |
//! | 1     | reserved                                |
//! | 16·n  | per dimension: `i64` index, `u64` size  |
//!
//! The payload follows: samples with dimension 0 fastest, optionally zlib
//! compressed as a single stream.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::pixel::PixelType;
use crate::image_pipeline::region::Region;
use crate::image_pipeline::writer::ImageLayout;

pub const MAGIC: [u8; 6] = *b"RGNVOL";
pub const VERSION: u8 = 1;
const FIXED_LEN: usize = 12;
const FLAG_COMPRESSED: u8 = 0b1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeHeader {
    pub pixel_type: PixelType,
    pub components: usize,
    pub index: Vec<i64>,
    pub size: Vec<usize>,
    pub compressed: bool,
}

impl VolumeHeader {
    pub fn from_layout<const D: usize>(layout: &ImageLayout<D>, compressed: bool) -> Self {
        Self {
            pixel_type: layout.pixel_type,
            components: layout.components,
            index: layout.region.index.to_vec(),
            size: layout.region.size.to_vec(),
            compressed,
        }
    }

    /// Encoded length, i.e. the byte offset of the payload.
    pub fn encoded_len(&self) -> usize {
        FIXED_LEN + 16 * self.size.len()
    }

    pub fn payload_len(&self) -> usize {
        self.size.iter().product::<usize>() * self.components * self.pixel_type.size()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.components > u8::MAX as usize || self.size.len() > u8::MAX as usize {
            return Err(PipelineError::EncodeError(format!(
                "{} components in {} dimensions do not fit the header",
                self.components,
                self.size.len()
            )));
        }
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&MAGIC);
        out.push(VERSION);
        out.push(self.pixel_type.tag());
        out.push(self.components as u8);
        out.push(self.size.len() as u8);
        out.push(if self.compressed { FLAG_COMPRESSED } else { 0 });
        out.push(0);
        for (index, size) in self.index.iter().zip(&self.size) {
            out.extend_from_slice(&index.to_le_bytes());
            out.extend_from_slice(&(*size as u64).to_le_bytes());
        }
        Ok(out)
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut fixed = [0u8; FIXED_LEN];
        reader.read_exact(&mut fixed)?;
        if fixed[..6] != MAGIC {
            return Err(PipelineError::DecodeError("not a volume file".to_string()));
        }
        if fixed[6] != VERSION {
            return Err(PipelineError::UnsupportedFormat(format!(
                "volume version {}",
                fixed[6]
            )));
        }
        let pixel_type = PixelType::from_tag(fixed[7])?;
        let components = fixed[8] as usize;
        let ndim = fixed[9] as usize;
        let compressed = fixed[10] & FLAG_COMPRESSED != 0;

        let mut index = Vec::with_capacity(ndim);
        let mut size = Vec::with_capacity(ndim);
        let mut word = [0u8; 8];
        for _ in 0..ndim {
            reader.read_exact(&mut word)?;
            index.push(i64::from_le_bytes(word));
            reader.read_exact(&mut word)?;
            size.push(u64::from_le_bytes(word) as usize);
        }

        Ok(Self {
            pixel_type,
            components,
            index,
            size,
            compressed,
        })
    }

    pub fn layout<const D: usize>(&self) -> Result<ImageLayout<D>> {
        if self.size.len() != D {
            return Err(PipelineError::HeaderMismatch(format!(
                "file has {} dimensions, expected {}",
                self.size.len(),
                D
            )));
        }
        let mut region = Region::from_size([0; D]);
        region.index.copy_from_slice(&self.index);
        region.size.copy_from_slice(&self.size);
        Ok(ImageLayout {
            region,
            pixel_type: self.pixel_type,
            components: self.components,
        })
    }

    /// Fails with `HeaderMismatch` unless this header describes `layout`.
    pub fn ensure_matches<const D: usize>(&self, layout: &ImageLayout<D>) -> Result<()> {
        let existing = self.layout::<D>()?;
        if existing != *layout {
            return Err(PipelineError::HeaderMismatch(format!(
                "file holds {} {:?} x{}, write expects {} {:?} x{}",
                existing.region,
                existing.pixel_type,
                existing.components,
                layout.region,
                layout.pixel_type,
                layout.components
            )));
        }
        Ok(())
    }
}

/// Reads the payload that follows the header, inflating it when needed.
pub fn read_payload<R: Read>(reader: R, header: &VolumeHeader) -> Result<Vec<u8>> {
    let expected = header.payload_len();
    let mut payload = Vec::with_capacity(expected);
    if header.compressed {
        ZlibDecoder::new(reader)
            .read_to_end(&mut payload)
            .map_err(|e| PipelineError::DecodeError(e.to_string()))?;
    } else {
        reader.take(expected as u64).read_to_end(&mut payload)?;
    }
    if payload.len() != expected {
        return Err(PipelineError::DecodeError(format!(
            "payload holds {} bytes, expected {}",
            payload.len(),
            expected
        )));
    }
    Ok(payload)
}

/// Writes `payload` after the header, deflating it when `compressed`.
pub fn write_payload<W: Write>(mut writer: W, payload: &[u8], compressed: bool) -> Result<()> {
    if compressed {
        let mut encoder = ZlibEncoder::new(writer, Compression::default());
        encoder.write_all(payload)?;
        encoder.finish()?.flush()?;
    } else {
        writer.write_all(payload)?;
        writer.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> ImageLayout<3> {
        ImageLayout {
            region: Region::new([-2, 0, 5], [4, 3, 2]),
            pixel_type: PixelType::U16,
            components: 2,
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let header = VolumeHeader::from_layout(&layout(), true);
        let bytes = header.encode().unwrap();
        assert_eq!(bytes.len(), header.encoded_len());
        let decoded = VolumeHeader::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.layout::<3>().unwrap(), layout());
        assert_eq!(decoded.payload_len(), 4 * 3 * 2 * 2 * 2);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = VolumeHeader::from_layout(&layout(), false).encode().unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            VolumeHeader::read_from(&mut bytes.as_slice()),
            Err(PipelineError::DecodeError(_))
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let header = VolumeHeader::from_layout(&layout(), false);
        assert!(matches!(header.layout::<2>(), Err(PipelineError::HeaderMismatch(_))));
    }

    #[test]
    fn test_payload_roundtrip_compressed() {
        let header = VolumeHeader::from_layout(&layout(), true);
        let payload: Vec<u8> = (0..header.payload_len()).map(|i| (i % 7) as u8).collect();
        let mut encoded = Vec::new();
        write_payload(&mut encoded, &payload, true).unwrap();
        assert_eq!(read_payload(encoded.as_slice(), &header).unwrap(), payload);
    }

    #[test]
    fn test_truncated_payload() {
        let header = VolumeHeader::from_layout(&layout(), false);
        let short = vec![0u8; header.payload_len() - 1];
        assert!(matches!(
            read_payload(short.as_slice(), &header),
            Err(PipelineError::DecodeError(_))
        ));
    }
}
