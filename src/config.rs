//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILCONVERT_CONFIG` (environment variable)
//! 2. `~/.config/mailconvert/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailconvert\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::render::encoding::EncodingNormalizer;
use crate::render::pdf::{PageSetup, PdfRenderer, WkHtmlToPdf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// PDF engine and page defaults.
    pub pdf: PdfConfig,
    /// Body decoding settings.
    pub encoding: EncodingConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
}

/// PDF rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// Path or name of the `wkhtmltopdf` binary.
    pub wkhtmltopdf: PathBuf,
    /// Page geometry used when a request does not override it.
    #[serde(flatten)]
    pub page: PageSetup,
}

/// Body decoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    /// Charset tried when a body is not valid UTF-8 (any WHATWG label).
    pub fallback_charset: String,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            cache_dir: None,
        }
    }
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            wkhtmltopdf: PathBuf::from("wkhtmltopdf"),
            page: PageSetup::default(),
        }
    }
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            fallback_charset: "iso-8859-1".to_string(),
        }
    }
}

impl Config {
    /// The PDF engine described by `[pdf]`.
    pub fn renderer(&self) -> Arc<dyn PdfRenderer> {
        Arc::new(WkHtmlToPdf::new(&self.pdf.wkhtmltopdf))
    }

    /// The body normalizer described by `[encoding]`.
    ///
    /// Unknown charset labels fall back to the built-in default.
    pub fn normalizer(&self) -> EncodingNormalizer {
        EncodingNormalizer::for_label(&self.encoding.fallback_charset).unwrap_or_else(|| {
            tracing::warn!(
                charset = %self.encoding.fallback_charset,
                "Unknown fallback charset, using default"
            );
            EncodingNormalizer::default()
        })
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Save configuration to the standard location, returning the path written.
pub fn save_config(config: &Config) -> anyhow::Result<PathBuf> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(path)
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILCONVERT_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mailconvert").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailconvert")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mailconvert.log")
}
