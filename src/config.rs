use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked up next to the executable when no `--config` is given.
pub const CONFIG_FILE_NAME: &str = "heic-converter.json";

/// Top-level configuration for heic-converter.
///
/// Holds the defaults used when a command-line flag is not given. Flags
/// always win over the file.
///
/// # Loading
///
/// ```rust,no_run
/// use heic_converter::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("heic-converter.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.conversion.format = "png".into();
/// config.output.recursive = false;
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Encoding and metadata defaults.
    pub conversion: ConversionDefaults,
    /// Directory walking and logging.
    pub output: OutputConfig,
}

/// Defaults for a single conversion.
///
/// `format` and `quality` are kept loose here and validated when a
/// [`ConversionOptions`](crate::converter::ConversionOptions) is built, so a
/// bad value in the file surfaces as the same error a bad flag would.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionDefaults {
    /// `"jpeg"` or `"png"`.
    pub format: String,
    /// JPEG quality, 1-100.
    pub quality: i64,
    /// Optimized Huffman tables (JPEG) or best compression (PNG).
    pub optimize: bool,
    /// Progressive JPEG.
    pub progressive: bool,
    /// Remove the `.heic` once its output is written.
    pub delete_original: bool,
    /// Reset EXIF Orientation to 1 in the output.
    pub strip_orientation: bool,
}

/// Output and behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Walk subdirectories of `--input_dir`.
    pub recursive: bool,
    /// Optional path to a log file. Logs go to stderr when unset.
    pub log_file: Option<String>,
}

impl Default for ConversionDefaults {
    fn default() -> Self {
        Self {
            format: "jpeg".to_string(),
            quality: 80,
            optimize: true,
            progressive: true,
            delete_original: false,
            strip_orientation: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            recursive: true,
            log_file: None,
        }
    }
}

impl Config {
    /// Resolve the config file path (same directory as the executable).
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join(CONFIG_FILE_NAME))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            // Only worth a warning when the user pointed at a file explicitly.
            if path.is_some() {
                log::warn!(
                    "Config file not found at {}. Using defaults.",
                    config_path.display()
                );
            }
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_cli_defaults() {
        let config = Config::default();
        assert_eq!(config.conversion.format, "jpeg");
        assert_eq!(config.conversion.quality, 80);
        assert!(config.conversion.optimize);
        assert!(config.conversion.progressive);
        assert!(!config.conversion.delete_original);
        assert!(!config.conversion.strip_orientation);
        assert!(config.output.recursive);
        assert!(config.output.log_file.is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cfg.json");

        let mut config = Config::default();
        config.conversion.format = "png".into();
        config.conversion.quality = 95;
        config.output.log_file = Some("run.log".into());
        config.save(Some(&path)).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.conversion.format, "png");
        assert_eq!(loaded.conversion.quality, 95);
        assert_eq!(loaded.output.log_file.as_deref(), Some("run.log"));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(Some(&dir.path().join("nope.json"))).unwrap();
        assert_eq!(config.conversion.quality, 80);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{ "conversion": { "delete_original": true } }"#).unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert!(config.conversion.delete_original);
        assert_eq!(config.conversion.format, "jpeg");
        assert!(config.output.recursive);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }
}
