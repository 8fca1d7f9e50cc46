//! JPEG / PNG encoding and metadata embedding.
//!
//! Encoding happens fully in memory: pixels are encoded, EXIF and ICC are
//! spliced in with img-parts, and only then is the file written. A failed
//! encode never touches the filesystem.

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::DynamicImage;
use img_parts::jpeg::Jpeg;
use img_parts::png::Png;
use img_parts::{Bytes, ImageEXIF, ImageICC};
use jpeg_encoder::{ColorType, Encoder};
use std::path::Path;

use crate::converter::{ConversionOptions, OutputFormat};
use crate::error::{ConvertError, Result};
use crate::heic::DecodedImage;

const MARKER_APP0: u8 = 0xE0;
const MARKER_APP1: u8 = 0xE1;
const EXIF_PREFIX: &[u8] = b"Exif\0\0";

/// Encode `decoded` per `options`, embedding `exif` (bare TIFF data) and
/// the decoded ICC profile. Errors are plain messages; the caller attaches
/// the output path.
pub fn encode(
    decoded: &DecodedImage,
    options: &ConversionOptions,
    exif: Option<&[u8]>,
) -> std::result::Result<Vec<u8>, String> {
    let icc = decoded.icc_profile.as_deref();
    match options.format {
        OutputFormat::Jpeg => {
            let encoded = encode_jpeg(&decoded.image, options)?;
            embed_jpeg_metadata(encoded, exif, icc)
        }
        OutputFormat::Png => {
            log::debug!(
                "PNG output ignores quality ({}) and progressive ({})",
                options.quality,
                options.progressive
            );
            let encoded = encode_png(&decoded.image, options.optimize)?;
            embed_png_metadata(encoded, exif, icc)
        }
    }
}

fn encode_jpeg(image: &DynamicImage, options: &ConversionOptions) -> std::result::Result<Vec<u8>, String> {
    // JPEG has no alpha channel; it is dropped here.
    let rgb = image.to_rgb8();
    let width = u16::try_from(rgb.width())
        .map_err(|_| format!("width {} exceeds the JPEG limit of 65535", rgb.width()))?;
    let height = u16::try_from(rgb.height())
        .map_err(|_| format!("height {} exceeds the JPEG limit of 65535", rgb.height()))?;

    let mut buf = Vec::new();
    let mut encoder = Encoder::new(&mut buf, options.quality);
    encoder.set_progressive(options.progressive);
    encoder.set_optimized_huffman_tables(options.optimize);
    encoder
        .encode(rgb.as_raw(), width, height, ColorType::Rgb)
        .map_err(|e| format!("JPEG encoding failed: {e}"))?;
    Ok(buf)
}

fn encode_png(image: &DynamicImage, optimize: bool) -> std::result::Result<Vec<u8>, String> {
    let compression = if optimize {
        CompressionType::Best
    } else {
        CompressionType::Default
    };

    let mut buf = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut buf, compression, FilterType::Adaptive);
    image
        .write_with_encoder(encoder)
        .map_err(|e| format!("PNG encoding failed: {e}"))?;
    Ok(buf)
}

fn embed_jpeg_metadata(
    encoded: Vec<u8>,
    exif: Option<&[u8]>,
    icc: Option<&[u8]>,
) -> std::result::Result<Vec<u8>, String> {
    if exif.is_none() && icc.is_none() {
        return Ok(encoded);
    }

    let mut jpeg = Jpeg::from_bytes(Bytes::from(encoded))
        .map_err(|e| format!("Failed to re-parse encoded JPEG: {e}"))?;

    if let Some(icc) = icc {
        jpeg.set_icc_profile(Some(Bytes::copy_from_slice(icc)));
    }

    if let Some(exif) = exif {
        jpeg.set_exif(Some(Bytes::copy_from_slice(exif)));

        // set_exif() does not put the segment first; many EXIF readers
        // expect APP1 right after APP0 (or at the very start).
        if let Some(pos) = find_exif_segment_pos(&jpeg) {
            let target = match jpeg.segments().first() {
                Some(seg) if seg.marker() == MARKER_APP0 => 1,
                _ => 0,
            };
            if pos > target {
                let segments = jpeg.segments_mut();
                let seg = segments.remove(pos);
                segments.insert(target, seg);
            }
        }
    }

    Ok(jpeg.encoder().bytes().to_vec())
}

fn embed_png_metadata(
    encoded: Vec<u8>,
    exif: Option<&[u8]>,
    icc: Option<&[u8]>,
) -> std::result::Result<Vec<u8>, String> {
    if exif.is_none() && icc.is_none() {
        return Ok(encoded);
    }

    let mut png = Png::from_bytes(Bytes::from(encoded))
        .map_err(|e| format!("Failed to re-parse encoded PNG: {e}"))?;
    if let Some(icc) = icc {
        png.set_icc_profile(Some(Bytes::copy_from_slice(icc)));
    }
    if let Some(exif) = exif {
        png.set_exif(Some(Bytes::copy_from_slice(exif)));
    }
    Ok(png.encoder().bytes().to_vec())
}

/// Find the position of the EXIF APP1 segment in a JPEG.
fn find_exif_segment_pos(jpeg: &Jpeg) -> Option<usize> {
    jpeg.segments()
        .iter()
        .position(|s| s.marker() == MARKER_APP1 && s.contents().starts_with(EXIF_PREFIX))
}

/// Write `bytes` to `output`, creating the parent directory if needed.
///
/// A partially written file is removed on failure.
pub fn write_file(output: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            ConvertError::write(output, format!("cannot create {}: {e}", parent.display()))
        })?;
    }

    if let Err(e) = std::fs::write(output, bytes) {
        if output.is_file() {
            let _ = std::fs::remove_file(output);
        }
        return Err(ConvertError::write(output, e));
    }
    Ok(())
}
