//! # heic-converter
//!
//! Convert HEIC photos (the iPhone default) to JPEG or PNG, keeping their EXIF
//! metadata and ICC profile, one file or a whole directory at a time.
//!
//! ## Quick Start
//!
//! Convert a single file with the same knobs as the command line:
//!
//! ```rust,no_run
//! use heic_converter::converter::convert_file;
//! use std::path::Path;
//!
//! let output = convert_file(
//!     Path::new("IMG_0001.HEIC"),
//!     None,   // next to the input
//!     80,     // quality
//!     true,   // optimize
//!     true,   // progressive
//!     "jpeg",
//!     false,  // keep the original
//! )?;
//! println!("Wrote {}", output.display());
//! # Ok::<(), heic_converter::ConvertError>(())
//! ```
//!
//! ## Batch Usage
//!
//! ```rust,no_run
//! use heic_converter::converter::{ConversionOptions, Converter};
//! use heic_converter::pipeline::{self, InputSource};
//! use std::path::PathBuf;
//!
//! let source = InputSource::from_args(None, Some(PathBuf::from("./photos")))?;
//! let options = ConversionOptions::new("png", 80)?;
//! let requests = pipeline::build_requests(&source, None, options, true)?;
//!
//! let summary = pipeline::run(&Converter::new(), &requests);
//! println!("{} of {} converted", summary.succeeded(), summary.total());
//! # Ok::<(), heic_converter::ConvertError>(())
//! ```
//!
//! ## Modules
//!
//! - [`converter`] — options, requests/results and the [`Converter`](converter::Converter)
//! - [`pipeline`] — input selection, directory discovery, batch runs
//! - [`heic`] — HEIC decoding and EXIF block handling
//! - [`encode`] — JPEG/PNG encoding and metadata embedding
//! - [`config`] — JSON config file with conversion defaults
//! - [`error`] — the [`ConvertError`] taxonomy

pub mod config;
pub mod converter;
pub mod encode;
pub mod error;
pub mod heic;
pub mod pipeline;

pub use error::ConvertError;
