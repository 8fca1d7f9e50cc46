use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::ConversionDefaults;
use crate::encode;
use crate::error::{ConvertError, Result};
use crate::heic::{self, HeicDecoder, HeifDecoder};

/// Target raster format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
}

impl OutputFormat {
    /// Extension given to generated output files.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    /// Format implied by an output file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            _ => Err(ConvertError::InvalidFormat(s.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
        })
    }
}

/// Encoding options shared by every file of a run.
///
/// `quality` and `progressive` only affect JPEG; PNG ignores them.
/// `optimize` means optimized Huffman tables for JPEG and the best zlib
/// level for PNG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionOptions {
    pub format: OutputFormat,
    pub quality: u8,
    pub optimize: bool,
    pub progressive: bool,
    pub delete_original: bool,
    /// Reset EXIF Orientation to 1, since libheif already rotated the pixels.
    pub strip_orientation: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Jpeg,
            quality: 80,
            optimize: true,
            progressive: true,
            delete_original: false,
            strip_orientation: false,
        }
    }
}

impl ConversionOptions {
    /// Options for `format` at `quality`, everything else at its default.
    ///
    /// Fails with [`ConvertError::InvalidFormat`] or
    /// [`ConvertError::InvalidParameter`].
    pub fn new(format: &str, quality: i64) -> Result<Self> {
        Ok(Self {
            format: format.parse()?,
            quality: validate_quality(quality)?,
            ..Self::default()
        })
    }

    /// Options from the config file's conversion section.
    pub fn from_config(defaults: &ConversionDefaults) -> Result<Self> {
        Ok(Self {
            format: defaults.format.parse()?,
            quality: validate_quality(defaults.quality)?,
            optimize: defaults.optimize,
            progressive: defaults.progressive,
            delete_original: defaults.delete_original,
            strip_orientation: defaults.strip_orientation,
        })
    }

    /// Re-check fields that can be set directly.
    pub fn validate(&self) -> Result<()> {
        validate_quality(i64::from(self.quality)).map(|_| ())
    }
}

/// Quality must be within 1..=100; values outside are rejected, not clamped.
pub fn validate_quality(quality: i64) -> Result<u8> {
    match u8::try_from(quality) {
        Ok(q @ 1..=100) => Ok(q),
        _ => Err(ConvertError::InvalidParameter(format!(
            "quality must be between 1 and 100, got {quality}"
        ))),
    }
}

/// Where a request writes its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// Next to the input, with the extension swapped.
    Beside,
    /// A file or directory, told apart by [`resolve_output_path`].
    Path(PathBuf),
    /// Exactly this file.
    File(PathBuf),
}

/// One file to convert.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub input: PathBuf,
    pub output: OutputTarget,
    pub options: ConversionOptions,
}

impl ConversionRequest {
    /// `output` is a file or directory as given on the command line; `None`
    /// writes next to the input.
    pub fn new(input: impl Into<PathBuf>, output: Option<PathBuf>, options: ConversionOptions) -> Self {
        Self {
            input: input.into(),
            output: output.map_or(OutputTarget::Beside, OutputTarget::Path),
            options,
        }
    }

    /// Request writing to an already resolved output file.
    pub fn to_file(input: impl Into<PathBuf>, output: impl Into<PathBuf>, options: ConversionOptions) -> Self {
        Self {
            input: input.into(),
            output: OutputTarget::File(output.into()),
            options,
        }
    }

    /// Where the converted file will be written.
    pub fn output_file(&self) -> PathBuf {
        match &self.output {
            OutputTarget::Beside => resolve_output_path(&self.input, None, self.options.format),
            OutputTarget::Path(out) => resolve_output_path(&self.input, Some(out), self.options.format),
            OutputTarget::File(file) => file.clone(),
        }
    }
}

/// `<stem>.<ext>` for `input`. Only the last extension is swapped:
/// "IMG_1.edit.HEIC" -> "IMG_1.edit.jpg"
pub fn output_file_name(input: &Path, format: OutputFormat) -> OsString {
    let mut file_name = input.file_stem().unwrap_or(input.as_os_str()).to_os_string();
    file_name.push(".");
    file_name.push(format.extension());
    file_name
}

/// Work out the output file for `input`.
///
/// - no `output`: `<input dir>/<stem>.<ext>`
/// - `output` with an image extension that is not an existing directory:
///   used as the file itself
/// - anything else is a directory: `<output>/<stem>.<ext>`
pub fn resolve_output_path(input: &Path, output: Option<&Path>, format: OutputFormat) -> PathBuf {
    let file_name = output_file_name(input, format);

    match output {
        None => input.with_file_name(file_name),
        Some(out) => {
            let named_format = out
                .extension()
                .and_then(|e| e.to_str())
                .and_then(OutputFormat::from_extension);
            match named_format {
                Some(named) if !out.is_dir() => {
                    if named != format {
                        log::warn!(
                            "Output {} has a .{} extension but {format} data will be written",
                            out.display(),
                            named.extension()
                        );
                    }
                    out.to_path_buf()
                }
                _ => out.join(file_name),
            }
        }
    }
}

/// The outcome of converting one file.
///
/// `output` is set as soon as the output file exists, so a failed delete
/// still reports where the converted image went.
#[derive(Debug)]
pub struct ConversionResult {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub deleted_original: bool,
    pub error: Option<ConvertError>,
}

impl ConversionResult {
    fn new(input: &Path) -> Self {
        Self {
            input: input.to_path_buf(),
            output: None,
            deleted_original: false,
            error: None,
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    /// Collapse into the output path or the recorded error.
    pub fn into_result(self) -> Result<PathBuf> {
        match (self.error, self.output) {
            (Some(err), _) => Err(err),
            (None, Some(path)) => Ok(path),
            (None, None) => Err(ConvertError::write(&self.input, "no output was produced")),
        }
    }
}

/// Decodes HEIC input and re-encodes it as JPEG or PNG.
///
/// # Example
///
/// ```rust,no_run
/// use heic_converter::converter::{ConversionOptions, ConversionRequest, Converter};
///
/// let converter = Converter::new();
/// let options = ConversionOptions::new("jpeg", 90).unwrap();
/// let request = ConversionRequest::new("IMG_0001.HEIC", None, options);
///
/// let result = converter.convert(&request);
/// match result.into_result() {
///     Ok(output) => println!("Wrote {}", output.display()),
///     Err(e) => eprintln!("{e}"),
/// }
/// ```
pub struct Converter {
    decoder: Box<dyn HeicDecoder>,
}

impl Default for Converter {
    fn default() -> Self {
        Self::new()
    }
}

impl Converter {
    /// Converter using the system libheif.
    pub fn new() -> Self {
        Self::with_decoder(Box::new(HeifDecoder::new()))
    }

    pub fn with_decoder(decoder: Box<dyn HeicDecoder>) -> Self {
        Self { decoder }
    }

    pub fn decoder_name(&self) -> &str {
        self.decoder.name()
    }

    /// Convert one file. Never panics on bad input; failures land in
    /// [`ConversionResult::error`].
    pub fn convert(&self, request: &ConversionRequest) -> ConversionResult {
        let mut result = ConversionResult::new(&request.input);
        if let Err(e) = self.run(request, &mut result) {
            result.error = Some(e);
        }
        result
    }

    fn run(&self, request: &ConversionRequest, result: &mut ConversionResult) -> Result<()> {
        let options = &request.options;
        options.validate()?;

        let input = &request.input;
        if !input.is_file() {
            return Err(ConvertError::FileNotFound(input.clone()));
        }
        if !heic::is_heic_path(input) {
            return Err(ConvertError::InvalidParameter(format!(
                "{} does not have a .heic extension",
                input.display()
            )));
        }

        let output = request.output_file();
        let decoded = self.decoder.decode(input)?;

        let mut exif = decoded.exif.clone();
        if options.strip_orientation {
            if let Some(tiff) = exif.as_mut() {
                if heic::exif::reset_orientation(tiff) {
                    log::debug!("Reset EXIF orientation for {}", input.display());
                }
            }
        }

        let bytes = encode::encode(&decoded, options, exif.as_deref())
            .map_err(|reason| ConvertError::write(&output, reason))?;
        drop(decoded);

        encode::write_file(&output, &bytes)?;
        result.output = Some(output.clone());
        log::info!("Converted {} to {}", input.display(), output.display());

        if options.delete_original {
            log::info!("Deleting original file: {}", input.display());
            std::fs::remove_file(input).map_err(|source| ConvertError::Delete {
                path: input.clone(),
                source,
            })?;
            result.deleted_original = true;
        }

        Ok(())
    }
}

/// Convert a single HEIC file with the libheif decoder.
///
/// Mirrors the command line: `output` is a file or directory, `image_format`
/// is `"jpeg"` or `"png"`. Returns the path of the written file.
pub fn convert_file(
    input: &Path,
    output: Option<&Path>,
    quality: i64,
    optimize: bool,
    progressive: bool,
    image_format: &str,
    delete: bool,
) -> Result<PathBuf> {
    let options = ConversionOptions {
        optimize,
        progressive,
        delete_original: delete,
        ..ConversionOptions::new(image_format, quality)?
    };
    let request = ConversionRequest::new(input, output.map(Path::to_path_buf), options);
    Converter::new().convert(&request).into_result()
}
