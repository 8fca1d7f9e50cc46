//! HEIC decoding and the EXIF plumbing around it.
//!
//! - [`HeicDecoder`] — trait the converter decodes through
//! - [`HeifDecoder`] — libheif-backed implementation
//! - [`exif`] — unwrapping HEIF `Exif` items and Orientation handling

mod decoder;
pub mod exif;

pub use decoder::{DecodedImage, HeicDecoder, HeifDecoder};

/// Extensions treated as HEIC input, compared case-insensitively.
pub const HEIC_EXTENSIONS: &[&str] = &["heic"];

/// Check if a path has a HEIC extension (`.heic`, `.HEIC`, ...).
pub fn is_heic_path(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| HEIC_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn heic_extensions_any_case() {
        assert!(is_heic_path(Path::new("IMG_0001.HEIC")));
        assert!(is_heic_path(Path::new("img.heic")));
        assert!(is_heic_path(Path::new("dir/img.HeIc")));
    }

    #[test]
    fn non_heic_paths() {
        assert!(!is_heic_path(Path::new("img.jpg")));
        assert!(!is_heic_path(Path::new("img.heif")));
        assert!(!is_heic_path(Path::new("heic")));
        assert!(!is_heic_path(Path::new("img.heic.bak")));
    }
}
