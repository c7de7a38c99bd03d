//! Internal helpers for turning raw buffers into pixels and samples.

use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use image::RgbImage;

use crate::error::GrabError;

/// Copy `rows` rows of `row_bytes` bytes out of a plane whose rows are
/// `stride` bytes apart, dropping any row padding.
pub(crate) fn pack_rows(data: &[u8], stride: usize, row_bytes: usize, rows: usize) -> Vec<u8> {
    if stride == row_bytes {
        return data[..(row_bytes * rows).min(data.len())].to_vec();
    }
    let mut buffer = Vec::with_capacity(row_bytes * rows);
    for row in 0..rows {
        let start = row * stride;
        let Some(line) = data.get(start..start + row_bytes) else {
            break;
        };
        buffer.extend_from_slice(line);
    }
    buffer
}

/// Wrap a packed RGB24 buffer as an image.
pub(crate) fn rgb_image(width: u32, height: u32, buffer: Vec<u8>) -> Result<RgbImage, GrabError> {
    let length = buffer.len();
    RgbImage::from_raw(width, height, buffer).ok_or_else(|| {
        GrabError::InvalidArgument(format!(
            "{length}-byte buffer does not hold a {width}x{height} RGB24 frame"
        ))
    })
}

/// Write interleaved little-endian PCM buffers to a WAV file.
pub(crate) fn write_wav<'a, I>(
    path: &Path,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
    buffers: I,
) -> Result<(), GrabError>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for buffer in buffers {
        match bits_per_sample {
            8 => {
                // WAV stores 8-bit PCM unsigned; hound takes it signed.
                for &byte in buffer {
                    writer.write_sample(byte.wrapping_sub(128) as i8)?;
                }
            }
            16 => {
                for chunk in buffer.chunks_exact(2) {
                    writer.write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))?;
                }
            }
            24 => {
                for chunk in buffer.chunks_exact(3) {
                    let value = i32::from_le_bytes([0, chunk[0], chunk[1], chunk[2]]) >> 8;
                    writer.write_sample(value)?;
                }
            }
            32 => {
                for chunk in buffer.chunks_exact(4) {
                    writer.write_sample(i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))?;
                }
            }
            other => {
                return Err(GrabError::InvalidArgument(format!(
                    "cannot write {other}-bit PCM to WAV"
                )));
            }
        }
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_rows_strips_padding() {
        let plane = [1, 2, 3, 0, 4, 5, 6, 0];
        assert_eq!(pack_rows(&plane, 4, 3, 2), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn pack_rows_copies_tight_planes_whole() {
        let plane = [1, 2, 3, 4, 5, 6];
        assert_eq!(pack_rows(&plane, 3, 3, 2), plane.to_vec());
    }

    #[test]
    fn rgb_image_rejects_short_buffers() {
        assert!(rgb_image(2, 2, vec![0; 11]).is_err());
        assert!(rgb_image(2, 2, vec![0; 12]).is_ok());
    }
}
