use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use heic_converter::config::Config;
use heic_converter::converter::{ConversionOptions, Converter};
use heic_converter::pipeline::{self, BatchSummary, InputSource};

/// Every file converted.
const EXIT_OK: u8 = 0;
/// At least one file failed.
const EXIT_FAILED: u8 = 1;
/// Nothing was attempted: bad arguments, bad config, missing input directory.
const EXIT_USAGE: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "heic-converter",
    version,
    about = "Convert HEIC images to JPEG or PNG, preserving EXIF metadata"
)]
struct Cli {
    /// Path to a single .HEIC file to be converted
    #[arg(long = "input_file", value_name = "FILE")]
    input_file: Option<PathBuf>,

    /// Path to a directory containing .HEIC files
    #[arg(long = "input_dir", value_name = "DIR")]
    input_dir: Option<PathBuf>,

    /// Output file or directory (default: next to each input)
    #[arg(long = "output_path", value_name = "PATH")]
    output_path: Option<PathBuf>,

    /// Delete the original file after a successful conversion
    #[arg(long)]
    delete: bool,

    /// Output image format: jpeg or png [default: jpeg]
    #[arg(long, value_name = "FORMAT")]
    format: Option<String>,

    /// Quality of the output image, 1-100 [default: 80]
    #[arg(long, value_name = "INT", allow_negative_numbers = true)]
    quality: Option<i64>,

    /// Optimize the output file size [default: true]
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    optimize: Option<bool>,

    /// Write progressive JPEGs [default: true]
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    progressive: Option<bool>,

    /// Reset EXIF orientation to normal (pixels are already rotated)
    #[arg(long = "strip_orientation")]
    strip_orientation: bool,

    /// Path to config file (default: heic-converter.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config file and exit
    #[arg(long)]
    init: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match start(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            // The logger may not be up yet (bad arguments, bad config).
            if log::log_enabled!(log::Level::Error) {
                log::error!("{e:#}");
            } else {
                eprintln!("Error: {e:#}");
            }
            ExitCode::from(EXIT_USAGE)
        }
    }
}

/// Argument checks, then config, then logging, then the run itself.
///
/// Nothing touches the filesystem before the input arguments are known to be
/// usable. `--init` skips the config load so it can replace a broken file.
fn start(cli: &Cli) -> Result<u8> {
    if cli.init {
        return init_config(cli.config.as_deref());
    }

    let source = InputSource::from_args(cli.input_file.clone(), cli.input_dir.clone())?;
    let config = Config::load(cli.config.as_deref())?;
    init_logging(cli.verbose, config.output.log_file.as_deref())?;

    run(cli, &source, &config)
}

fn init_config(path: Option<&Path>) -> Result<u8> {
    Config::default().save(path)?;
    let save_path = match path {
        Some(p) => p.to_path_buf(),
        None => Config::config_path()?,
    };
    println!("Default config written to {}", save_path.display());
    Ok(EXIT_OK)
}

fn init_logging(verbose: bool, log_file: Option<&str>) -> Result<()> {
    let log_level = if verbose { "debug" } else { "info" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {path}"))?;
            builder
                .target(env_logger::Target::Pipe(Box::new(file)))
                .format_timestamp_secs();
        }
        None => {
            builder.format_timestamp(None);
        }
    }

    builder.init();
    Ok(())
}

fn run(cli: &Cli, source: &InputSource, config: &Config) -> Result<u8> {
    let options = resolve_options(cli, config)?;

    let requests = pipeline::build_requests(
        source,
        cli.output_path.as_deref(),
        options,
        config.output.recursive,
    )?;
    if requests.is_empty() {
        log::warn!("No .HEIC files to convert");
        return Ok(EXIT_OK);
    }

    log::info!(
        "Converting {} file(s) to {} (quality {}, optimize {}, progressive {})",
        requests.len(),
        options.format,
        options.quality,
        options.optimize,
        options.progressive
    );
    if options.delete_original {
        log::info!("Originals will be deleted after successful conversion");
    }

    let converter = Converter::new();
    log::debug!("Decoder: {}", converter.decoder_name());
    let summary = pipeline::run(&converter, &requests);

    if cli.json {
        print_json(&summary)?;
    }

    log::info!(
        "Done: {} succeeded, {} failed out of {} file(s)",
        summary.succeeded(),
        summary.failed(),
        summary.total()
    );

    Ok(if summary.all_succeeded() {
        EXIT_OK
    } else {
        EXIT_FAILED
    })
}

/// Config defaults, overridden by whatever was given on the command line.
fn resolve_options(cli: &Cli, config: &Config) -> Result<ConversionOptions> {
    let mut defaults = config.conversion.clone();
    if let Some(ref format) = cli.format {
        defaults.format = format.clone();
    }
    if let Some(quality) = cli.quality {
        defaults.quality = quality;
    }
    if let Some(optimize) = cli.optimize {
        defaults.optimize = optimize;
    }
    if let Some(progressive) = cli.progressive {
        defaults.progressive = progressive;
    }
    defaults.delete_original |= cli.delete;
    defaults.strip_orientation |= cli.strip_orientation;

    Ok(ConversionOptions::from_config(&defaults)?)
}

fn print_json(summary: &BatchSummary) -> Result<()> {
    let json_results: Vec<serde_json::Value> = summary
        .results
        .iter()
        .map(|r| {
            serde_json::json!({
                "input": r.input.display().to_string(),
                "output": r.output.as_ref().map(|p| p.display().to_string()),
                "deleted_original": r.deleted_original,
                "success": r.success(),
                "error_kind": r.error.as_ref().map(|e| e.kind()),
                "error": r.error.as_ref().map(|e| e.to_string()),
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json_results)?);
    Ok(())
}
