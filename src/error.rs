use std::path::{Path, PathBuf};
use thiserror::Error;

/// Everything that can go wrong while converting a HEIC file.
///
/// Variants carry the offending path or value so a message printed in the
/// middle of a batch still says which file failed and why.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Conflicting or missing command-line arguments.
    #[error("usage error: {0}")]
    Usage(String),

    /// The input file (or input directory) does not exist.
    #[error("input '{}' does not exist", .0.display())]
    FileNotFound(PathBuf),

    /// The requested output format is not JPEG or PNG.
    #[error("unsupported output format '{0}' (expected jpeg or png)")]
    InvalidFormat(String),

    /// An option value is out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The input could not be decoded as HEIC.
    #[error("failed to decode '{}': {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    /// Encoding or writing the output failed.
    #[error("failed to write '{}': {reason}", path.display())]
    Write { path: PathBuf, reason: String },

    /// The output was written but the original could not be removed.
    #[error("converted, but failed to delete original '{}': {source}", path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConvertError {
    pub(crate) fn decode(path: &Path, reason: impl ToString) -> Self {
        Self::Decode {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn write(path: &Path, reason: impl ToString) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Stable snake_case name of the variant, used in JSON reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Usage(_) => "usage",
            Self::FileNotFound(_) => "file_not_found",
            Self::InvalidFormat(_) => "invalid_format",
            Self::InvalidParameter(_) => "invalid_parameter",
            Self::Decode { .. } => "decode",
            Self::Write { .. } => "write",
            Self::Delete { .. } => "delete",
        }
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_file() {
        let err = ConvertError::decode(Path::new("/photos/IMG_0001.HEIC"), "bad ftyp");
        let msg = err.to_string();
        assert!(msg.contains("IMG_0001.HEIC"));
        assert!(msg.contains("bad ftyp"));
    }

    #[test]
    fn kinds_are_stable() {
        assert_eq!(ConvertError::Usage("x".into()).kind(), "usage");
        assert_eq!(ConvertError::InvalidFormat("bmp".into()).kind(), "invalid_format");
        assert_eq!(
            ConvertError::write(Path::new("a.jpg"), "disk full").kind(),
            "write"
        );
        let delete = ConvertError::Delete {
            path: PathBuf::from("a.heic"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert_eq!(delete.kind(), "delete");
    }
}
