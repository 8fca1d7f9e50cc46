use image::{DynamicImage, RgbImage, RgbaImage};
use libheif_rs::{ColorSpace, HeifContext, ImageHandle, LibHeif, RgbChroma};
use std::path::Path;

use super::exif::tiff_from_heif_block;
use crate::error::{ConvertError, Result};

/// A decoded HEIC primary image plus the metadata worth carrying over.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// Pixels, with the container's rotation/mirroring already applied.
    pub image: DynamicImage,
    /// Bare TIFF-structured EXIF data (no HEIF offset, no `Exif\0\0`).
    pub exif: Option<Vec<u8>>,
    /// Raw ICC profile.
    pub icc_profile: Option<Vec<u8>>,
}

/// Turns a source file into pixels and metadata.
///
/// The converter only talks to this trait, so the libheif-backed
/// [`HeifDecoder`] can be swapped out (tests use an in-memory decoder).
pub trait HeicDecoder {
    /// Short name for log lines.
    fn name(&self) -> &str;

    /// Decode the primary image of `path`.
    fn decode(&self, path: &Path) -> Result<DecodedImage>;
}

/// HEIC decoder backed by the system libheif.
pub struct HeifDecoder {
    lib_heif: LibHeif,
}

impl HeifDecoder {
    pub fn new() -> Self {
        Self {
            lib_heif: LibHeif::new(),
        }
    }
}

impl Default for HeifDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HeicDecoder for HeifDecoder {
    fn name(&self) -> &str {
        "libheif"
    }

    fn decode(&self, path: &Path) -> Result<DecodedImage> {
        let data = std::fs::read(path).map_err(|e| ConvertError::decode(path, e))?;
        let ctx = HeifContext::read_from_bytes(&data)
            .map_err(|e| ConvertError::decode(path, format!("not a readable HEIC file: {e}")))?;
        let handle = ctx
            .primary_image_handle()
            .map_err(|e| ConvertError::decode(path, format!("no primary image: {e}")))?;

        let has_alpha = handle.has_alpha_channel();
        let chroma = if has_alpha { RgbChroma::Rgba } else { RgbChroma::Rgb };

        let decoded = self
            .lib_heif
            .decode(&handle, ColorSpace::Rgb(chroma), None)
            .map_err(|e| ConvertError::decode(path, e))?;

        let planes = decoded.planes();
        let plane = planes
            .interleaved
            .ok_or_else(|| ConvertError::decode(path, "decoder returned no interleaved plane"))?;

        let channels = if has_alpha { 4 } else { 3 };
        let pixels = pack_rows(plane.data, plane.width, plane.height, plane.stride, channels)
            .ok_or_else(|| ConvertError::decode(path, "decoded plane is shorter than expected"))?;

        let image = if has_alpha {
            RgbaImage::from_raw(plane.width, plane.height, pixels).map(DynamicImage::ImageRgba8)
        } else {
            RgbImage::from_raw(plane.width, plane.height, pixels).map(DynamicImage::ImageRgb8)
        }
        .ok_or_else(|| ConvertError::decode(path, "failed to build raster from decoded plane"))?;

        let exif = read_exif_block(&handle);
        let icc_profile = handle
            .color_profile_raw()
            .map(|profile| profile.data)
            .filter(|data| !data.is_empty());

        log::debug!(
            "Decoded {} ({}x{}, alpha: {has_alpha}, exif: {}, icc: {})",
            path.display(),
            image.width(),
            image.height(),
            exif.as_ref().map_or(0, Vec::len),
            icc_profile.as_ref().map_or(0, Vec::len),
        );

        Ok(DecodedImage {
            image,
            exif,
            icc_profile,
        })
    }
}

/// Copy the visible part of each row, dropping libheif's row padding.
fn pack_rows(data: &[u8], width: u32, height: u32, stride: usize, channels: usize) -> Option<Vec<u8>> {
    let row_len = width as usize * channels;
    if stride == row_len {
        return data.get(..row_len * height as usize).map(<[u8]>::to_vec);
    }

    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for y in 0..height as usize {
        let start = y * stride;
        pixels.extend_from_slice(data.get(start..start + row_len)?);
    }
    Some(pixels)
}

/// First `Exif` metadata block of the image, unwrapped to TIFF data.
fn read_exif_block(handle: &ImageHandle) -> Option<Vec<u8>> {
    let count = handle.number_of_metadata_blocks(b"Exif").max(0) as usize;
    let mut ids = vec![0; count];
    let count = handle.metadata_block_ids(&mut ids, b"Exif");
    for &id in &ids[..count] {
        match handle.metadata(id) {
            Ok(block) => match tiff_from_heif_block(&block) {
                Some(tiff) => return Some(tiff.to_vec()),
                None => log::debug!("Skipping malformed Exif block {id}"),
            },
            Err(e) => log::debug!("Failed to read Exif block {id}: {e}"),
        }
    }
    None
}
