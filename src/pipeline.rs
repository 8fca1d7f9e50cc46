use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::converter::{
    ConversionOptions, ConversionRequest, ConversionResult, Converter, OutputFormat, output_file_name,
};
use crate::error::{ConvertError, Result};
use crate::heic::is_heic_path;

/// What to convert: one file, or every HEIC file under a directory.
///
/// # Example
///
/// ```rust
/// use heic_converter::pipeline::InputSource;
/// use std::path::PathBuf;
///
/// let source = InputSource::from_args(Some(PathBuf::from("IMG_0001.HEIC")), None).unwrap();
/// assert!(matches!(source, InputSource::File(_)));
///
/// // Both (or neither) is a usage error
/// assert!(InputSource::from_args(None, None).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    File(PathBuf),
    Directory(PathBuf),
}

impl InputSource {
    /// Exactly one of `input_file` / `input_dir` must be given.
    ///
    /// Pure argument check: the filesystem is not consulted.
    pub fn from_args(input_file: Option<PathBuf>, input_dir: Option<PathBuf>) -> Result<Self> {
        match (input_file, input_dir) {
            (Some(file), None) => Ok(Self::File(file)),
            (None, Some(dir)) => Ok(Self::Directory(dir)),
            (Some(_), Some(_)) => Err(ConvertError::Usage(
                "--input_file and --input_dir are mutually exclusive".to_string(),
            )),
            (None, None) => Err(ConvertError::Usage(
                "one of --input_file or --input_dir is required".to_string(),
            )),
        }
    }
}

/// Collect `.heic` files (any case) under `dir`, sorted by path.
///
/// Subdirectories are walked when `recursive` is set. Unreadable entries are
/// logged and skipped.
pub fn collect_heic_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ConvertError::FileNotFound(dir.to_path_buf()));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).max_depth(max_depth).follow_links(true) {
        match entry {
            Ok(entry) => {
                let p = entry.path();
                if entry.file_type().is_file() && is_heic_path(p) {
                    files.push(p.to_path_buf());
                }
            }
            Err(e) => log::warn!("Skipping unreadable entry: {e}"),
        }
    }
    files.sort();

    log::info!("Found {} .HEIC file(s) in {}", files.len(), dir.display());
    Ok(files)
}

/// Turn an input source into one request per file.
///
/// For directories, `output` is always a directory. It mirrors the input
/// tree so files with the same name in different subdirectories do not
/// overwrite each other. Without `output`, each file is written next to its
/// source. No two requests of a batch share an output file.
pub fn build_requests(
    source: &InputSource,
    output: Option<&Path>,
    options: ConversionOptions,
    recursive: bool,
) -> Result<Vec<ConversionRequest>> {
    match source {
        InputSource::File(file) => Ok(vec![ConversionRequest::new(
            file,
            output.map(Path::to_path_buf),
            options,
        )]),
        InputSource::Directory(dir) => {
            let files = collect_heic_files(dir, recursive)?;
            let mut taken = HashSet::new();
            Ok(files
                .into_iter()
                .map(|file| {
                    let parent = file.parent().unwrap_or(Path::new(""));
                    let target_dir = match output {
                        Some(out_dir) => out_dir.join(parent.strip_prefix(dir).unwrap_or(Path::new(""))),
                        None => parent.to_path_buf(),
                    };
                    let output_file = unique_output(&file, &target_dir, options.format, &mut taken);
                    ConversionRequest::to_file(file, output_file, options)
                })
                .collect())
        }
    }
}

/// Output file in `target_dir` that no earlier request has claimed.
///
/// `IMG.HEIC` and `IMG.heic` both map to `IMG.jpg`; the later one keeps its
/// source extension in the name (`IMG_heic.jpg`), then gets a counter.
fn unique_output(
    file: &Path,
    target_dir: &Path,
    format: OutputFormat,
    taken: &mut HashSet<String>,
) -> PathBuf {
    let plain = target_dir.join(output_file_name(file, format));
    if claim(&plain, taken) {
        return plain;
    }

    let stem = file.file_stem().unwrap_or(file.as_os_str()).to_string_lossy();
    let source_ext = file.extension().unwrap_or_default().to_string_lossy();
    let base = format!("{stem}_{source_ext}");
    let mut candidate = target_dir.join(format!("{base}.{}", format.extension()));
    let mut n = 2;
    while !claim(&candidate, taken) {
        candidate = target_dir.join(format!("{base}_{n}.{}", format.extension()));
        n += 1;
    }

    log::warn!(
        "{} would overwrite {}, writing {} instead",
        file.display(),
        plain.display(),
        candidate.display()
    );
    candidate
}

// Case-folded so `IMG.jpg` and `img.JPG` also clash on case-insensitive filesystems.
fn claim(path: &Path, taken: &mut HashSet<String>) -> bool {
    taken.insert(path.to_string_lossy().to_lowercase())
}

/// Results of a run, in processing order.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub results: Vec<ConversionResult>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }
}

/// Convert every request in order.
///
/// A failing file is logged and recorded; the run always continues with the
/// next one.
pub fn run(converter: &Converter, requests: &[ConversionRequest]) -> BatchSummary {
    let total = requests.len();
    let mut summary = BatchSummary::default();

    for (i, request) in requests.iter().enumerate() {
        log::debug!("[{}/{}] Processing: {}", i + 1, total, request.input.display());

        let result = converter.convert(request);
        if let Some(ref err) = result.error {
            log::error!("[{}/{}] {err}", i + 1, total);
        }
        summary.results.push(result);
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::OutputTarget;
    use crate::converter::tests::{fake_converter, write_fake_heic};
    use std::fs;
    use tempfile::TempDir;

    // ── InputSource ──────────────────────────────────────────────────

    #[test]
    fn exactly_one_input() {
        assert_eq!(
            InputSource::from_args(Some("a.heic".into()), None).unwrap(),
            InputSource::File("a.heic".into())
        );
        assert_eq!(
            InputSource::from_args(None, Some("dir".into())).unwrap(),
            InputSource::Directory("dir".into())
        );
    }

    #[test]
    fn both_or_neither_is_usage_error() {
        // Paths that don't exist: the check must not need the filesystem.
        let both = InputSource::from_args(
            Some("/does/not/exist.heic".into()),
            Some("/does/not/exist".into()),
        );
        assert!(matches!(both, Err(ConvertError::Usage(_))));
        assert!(matches!(InputSource::from_args(None, None), Err(ConvertError::Usage(_))));
    }

    // ── collect_heic_files ───────────────────────────────────────────

    #[test]
    fn collects_heic_any_case_recursively() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(dir.path().join("a.heic"), b"x").unwrap();
        fs::write(dir.path().join("B.HEIC"), b"x").unwrap();
        fs::write(dir.path().join("c.jpg"), b"x").unwrap();
        fs::write(sub.join("d.Heic"), b"x").unwrap();

        let files = collect_heic_files(dir.path(), true).unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.windows(2).all(|w| w[0] <= w[1]), "sorted");

        let top_only = collect_heic_files(dir.path(), false).unwrap();
        assert_eq!(top_only.len(), 2);
    }

    #[test]
    fn missing_directory_is_file_not_found() {
        let err = collect_heic_files(Path::new("/nonexistent/photos"), true).unwrap_err();
        assert!(matches!(err, ConvertError::FileNotFound(_)));
    }

    #[test]
    fn file_as_directory_is_file_not_found() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.heic");
        fs::write(&file, b"x").unwrap();
        assert!(collect_heic_files(&file, true).is_err());
    }

    // ── build_requests ───────────────────────────────────────────────

    #[test]
    fn directory_output_mirrors_tree() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in");
        fs::create_dir_all(input.join("x")).unwrap();
        fs::create_dir_all(input.join("y")).unwrap();
        fs::write(input.join("x/same.heic"), b"x").unwrap();
        fs::write(input.join("y/same.heic"), b"x").unwrap();
        let out = dir.path().join("out");

        let requests = build_requests(
            &InputSource::Directory(input),
            Some(&out),
            ConversionOptions::default(),
            true,
        )
        .unwrap();
        let outputs: Vec<PathBuf> = requests.iter().map(|r| r.output_file()).collect();
        assert_eq!(outputs, vec![out.join("x/same.jpg"), out.join("y/same.jpg")]);
    }

    #[test]
    fn directory_without_output_writes_next_to_sources() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.HEIC"), b"x").unwrap();

        let requests = build_requests(
            &InputSource::Directory(dir.path().to_path_buf()),
            None,
            ConversionOptions::default(),
            true,
        )
        .unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].output_file(), dir.path().join("a.jpg"));
    }

    #[test]
    fn single_file_request_keeps_output_as_given() {
        let requests = build_requests(
            &InputSource::File("a.heic".into()),
            Some(Path::new("cover.png")),
            ConversionOptions::default(),
            true,
        )
        .unwrap();
        assert_eq!(requests[0].output, OutputTarget::Path(PathBuf::from("cover.png")));
    }

    #[test]
    fn batch_output_with_image_extension_is_a_directory() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in");
        fs::create_dir(&input).unwrap();
        fs::write(input.join("a.heic"), b"x").unwrap();
        fs::write(input.join("b.heic"), b"x").unwrap();
        let album = dir.path().join("album.jpg");

        let requests = build_requests(
            &InputSource::Directory(input),
            Some(&album),
            ConversionOptions::default(),
            true,
        )
        .unwrap();
        let outputs: Vec<PathBuf> = requests.iter().map(|r| r.output_file()).collect();
        assert_eq!(outputs, vec![album.join("a.jpg"), album.join("b.jpg")]);
    }

    #[test]
    fn clashing_output_names_are_made_unique() {
        let out = Path::new("/out");
        let mut taken = HashSet::new();
        let mut next = |file: &str| unique_output(Path::new(file), out, OutputFormat::Jpeg, &mut taken);

        assert_eq!(next("/in/IMG.heic"), out.join("IMG.jpg"));
        assert_eq!(next("/in/x/IMG.heic"), out.join("IMG_heic.jpg"));
        assert_eq!(next("/in/IMG.HEIC"), out.join("IMG_HEIC_2.jpg"));
        assert_eq!(next("/in/other.heic"), out.join("other.jpg"));
    }

    // Two sources differing only in case need a case-sensitive filesystem.
    #[cfg(target_os = "linux")]
    #[test]
    fn case_variants_each_get_their_own_output() {
        let dir = TempDir::new().unwrap();
        write_fake_heic(&dir.path().join("IMG.heic"), 10, 10);
        write_fake_heic(&dir.path().join("IMG.HEIC"), 20, 20);

        let options = ConversionOptions {
            delete_original: true,
            ..ConversionOptions::default()
        };
        let requests = build_requests(
            &InputSource::Directory(dir.path().to_path_buf()),
            None,
            options,
            true,
        )
        .unwrap();
        let summary = run(&fake_converter(None), &requests);
        assert_eq!(summary.succeeded(), 2);

        let mut remaining: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        remaining.sort();
        assert_eq!(remaining, vec!["IMG.jpg", "IMG_heic.jpg"]);

        // Sorted walk: IMG.HEIC (20x20) comes first and keeps the plain name.
        let dims = |name: &str| {
            let img = image::open(dir.path().join(name)).unwrap();
            (img.width(), img.height())
        };
        assert_eq!(dims("IMG.jpg"), (20, 20));
        assert_eq!(dims("IMG_heic.jpg"), (10, 10));
    }

    // ── run ──────────────────────────────────────────────────────────

    #[test]
    fn batch_continues_past_corrupt_file() {
        let dir = TempDir::new().unwrap();
        write_fake_heic(&dir.path().join("1_good.heic"), 12, 12);
        fs::write(dir.path().join("2_corrupt.HEIC"), b"not an image").unwrap();
        write_fake_heic(&dir.path().join("3_good.heic"), 12, 12);

        let requests = build_requests(
            &InputSource::Directory(dir.path().to_path_buf()),
            None,
            ConversionOptions::default(),
            true,
        )
        .unwrap();
        let summary = run(&fake_converter(None), &requests);

        assert_eq!(summary.total(), 3);
        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.failed(), 1);
        assert!(!summary.all_succeeded());
        assert!(dir.path().join("1_good.jpg").exists());
        assert!(dir.path().join("3_good.jpg").exists());
        assert!(!dir.path().join("2_corrupt.jpg").exists());

        let failed = summary.results.iter().find(|r| !r.success()).unwrap();
        assert!(failed.input.ends_with("2_corrupt.HEIC"));
        assert_eq!(failed.error.as_ref().unwrap().kind(), "decode");
    }

    #[test]
    fn batch_delete_only_removes_converted_sources() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.heic");
        let bad = dir.path().join("bad.heic");
        write_fake_heic(&good, 8, 8);
        fs::write(&bad, b"junk").unwrap();

        let options = ConversionOptions {
            delete_original: true,
            ..ConversionOptions::default()
        };
        let requests = build_requests(
            &InputSource::Directory(dir.path().to_path_buf()),
            None,
            options,
            true,
        )
        .unwrap();
        let summary = run(&fake_converter(None), &requests);

        assert_eq!(summary.succeeded(), 1);
        assert!(!good.exists());
        assert!(bad.exists());
    }

    #[test]
    fn empty_run() {
        let summary = run(&fake_converter(None), &[]);
        assert_eq!(summary.total(), 0);
        assert!(summary.all_succeeded());
    }
}
