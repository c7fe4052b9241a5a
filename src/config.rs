//! Configuration loaded once at process start.
//!
//! The config file is TOML. Only the `[ollama]` table is required:
//!
//! ```toml
//! [ollama]
//! host  = "http://localhost:11434"
//! model = "llama3"
//! ```
//!
//! Every other table (`[engine]`, `[ocr]`, `[server]`) is optional and falls
//! back to the defaults documented on its fields. The record is immutable
//! after loading; there is no reload.
//!
//! Besides the file, two process environment variables are set
//! unconditionally at startup by [`apply_process_env`] before any thread is
//! spawned. They are fixed for the process lifetime and read back by the
//! collaborators through [`ocr_workers`] and [`current_surface`].

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Worker concurrency hint for the OCR fallback.
pub const OCR_WORKERS_VAR: &str = "INVOICE_ANALYST_OCR_WORKERS";

/// Execution-context flag: which display surface is driving this process.
pub const SURFACE_VAR: &str = "INVOICE_ANALYST_SURFACE";

/// Default config file name, resolved relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Chat endpoint. Required.
    pub ollama: OllamaConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub ocr: OcrConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// `[ollama]`: where the analysis prompt is sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL of the Ollama server, e.g. `http://localhost:11434`.
    pub host: String,

    /// Model identifier, e.g. `llama3` or `mistral:7b-instruct`.
    pub model: String,

    /// Sampling temperature. `None` leaves the model's default in place.
    #[serde(default)]
    pub temperature: Option<f32>,

    /// TCP connect timeout in seconds. Default: 10.
    ///
    /// Only the connection is bounded; a started stream is consumed to the
    /// end without a deadline.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// `[engine]`: how the PDFium library is located.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to `libpdfium` (file or containing directory). When unset the
    /// engine tries `PDFIUM_LIB_PATH`, the executable's directory and then
    /// the system library search path.
    #[serde(default)]
    pub library_path: Option<PathBuf>,
}

/// `[ocr]`: vision transcription of pages that have no text layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Default: false.
    #[serde(default)]
    pub enabled: bool,

    /// edgequake-llm provider name (`ollama`, `openai`, `anthropic`, ...).
    #[serde(default = "default_ocr_provider")]
    pub provider: String,

    /// Vision-capable model. Default: `llava`.
    #[serde(default = "default_ocr_model")]
    pub model: String,

    /// Longest edge of a rendered page in pixels. Default: 2000.
    #[serde(default = "default_max_rendered_pixels")]
    pub max_rendered_pixels: u32,

    /// Default: 0.1.
    #[serde(default = "default_ocr_temperature")]
    pub temperature: f32,

    /// Default: 4096.
    #[serde(default = "default_ocr_max_tokens")]
    pub max_tokens: usize,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_ocr_provider(),
            model: default_ocr_model(),
            max_rendered_pixels: default_max_rendered_pixels(),
            temperature: default_ocr_temperature(),
            max_tokens: default_ocr_max_tokens(),
        }
    }
}

/// `[server]`: the web surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Default: `127.0.0.1`.
    #[serde(default = "default_server_host")]
    pub host: String,

    /// Default: 8501.
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Largest accepted upload in MiB. Default: 25.
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

impl ServerConfig {
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_ocr_provider() -> String {
    "ollama".to_string()
}
fn default_ocr_model() -> String {
    "llava".to_string()
}
fn default_max_rendered_pixels() -> u32 {
    2000
}
fn default_ocr_temperature() -> f32 {
    0.1
}
fn default_ocr_max_tokens() -> usize {
    4096
}
fn default_server_host() -> String {
    "127.0.0.1".to_string()
}
fn default_server_port() -> u16 {
    8501
}
fn default_max_upload_mb() -> usize {
    25
}

impl AppConfig {
    /// Minimal configuration pointing at an Ollama server.
    pub fn new(host: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            ollama: OllamaConfig {
                host: host.into(),
                model: model.into(),
                temperature: None,
                connect_timeout_secs: default_connect_timeout_secs(),
            },
            engine: EngineConfig::default(),
            ocr: OcrConfig::default(),
            server: ServerConfig::default(),
        }
    }

    /// Read and validate the config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&raw).map_err(|e| match e {
            ConfigError::Parse { detail, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                detail,
            },
            other => other,
        })?;
        tracing::debug!(path = %path.display(), ?config, "configuration loaded");
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            detail: e.message().to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let host = self.ollama.host.trim();
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "ollama.host must be an http(s) URL, got '{}'",
                self.ollama.host
            )));
        }
        if self.ollama.model.trim().is_empty() {
            return Err(ConfigError::Invalid("ollama.model must not be empty".into()));
        }
        if let Some(t) = self.ollama.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::Invalid(format!(
                    "ollama.temperature must be between 0.0 and 2.0, got {t}"
                )));
            }
        }
        if self.ocr.enabled && self.ocr.model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "ocr.model must not be empty when ocr.enabled = true".into(),
            ));
        }
        if self.server.max_upload_mb == 0 {
            return Err(ConfigError::Invalid("server.max_upload_mb must be at least 1".into()));
        }
        Ok(())
    }
}

// ── Process environment ──────────────────────────────────────────────────

/// Which display surface drives the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Terminal,
    Web,
}

impl Surface {
    pub fn as_str(self) -> &'static str {
        match self {
            Surface::Terminal => "terminal",
            Surface::Web => "web",
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set the two process-wide variables. Overwrites any inherited value.
///
/// Must run before the async runtime (or any other thread) starts.
pub fn apply_process_env(surface: Surface) {
    std::env::set_var(OCR_WORKERS_VAR, "1");
    std::env::set_var(SURFACE_VAR, surface.as_str());
}

/// OCR concurrency hint; at least 1.
pub fn ocr_workers() -> usize {
    std::env::var(OCR_WORKERS_VAR)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .max(1)
}

/// The surface recorded by [`apply_process_env`], if any.
pub fn current_surface() -> Option<Surface> {
    match std::env::var(SURFACE_VAR).ok()?.as_str() {
        "terminal" => Some(Surface::Terminal),
        "web" => Some(Surface::Web),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [ollama]
        host = "http://localhost:11434"
        model = "llama3"
    "#;

    #[test]
    fn minimal_file_uses_defaults() {
        let c = AppConfig::parse(MINIMAL).unwrap();
        assert_eq!(c.ollama.host, "http://localhost:11434");
        assert_eq!(c.ollama.model, "llama3");
        assert_eq!(c.ollama.temperature, None);
        assert_eq!(c.ollama.connect_timeout_secs, 10);
        assert!(!c.ocr.enabled);
        assert_eq!(c.ocr.model, "llava");
        assert_eq!(c.server.port, 8501);
        assert_eq!(c.server.max_upload_bytes(), 25 * 1024 * 1024);
        assert!(c.engine.library_path.is_none());
    }

    #[test]
    fn missing_model_names_the_key() {
        let err = AppConfig::parse(
            r#"
            [ollama]
            host = "http://localhost:11434"
            "#,
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("model"), "got: {msg}");
    }

    #[test]
    fn missing_ollama_table_is_an_error() {
        let err = AppConfig::parse("[server]\nport = 9000\n").unwrap_err();
        assert!(err.to_string().contains("ollama"), "got: {err}");
    }

    #[test]
    fn host_must_be_http() {
        let err = AppConfig::parse(
            r#"
            [ollama]
            host = "localhost:11434"
            model = "llama3"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn full_file_round_trips_sections() {
        let c = AppConfig::parse(
            r#"
            [ollama]
            host = "https://ollama.internal:443"
            model = "mistral"
            temperature = 0.2

            [engine]
            library_path = "/opt/pdfium/lib"

            [ocr]
            enabled = true
            model = "llama3.2-vision"

            [server]
            host = "0.0.0.0"
            port = 9000
            max_upload_mb = 5
            "#,
        )
        .unwrap();
        assert_eq!(c.ollama.temperature, Some(0.2));
        assert_eq!(
            c.engine.library_path.as_deref(),
            Some(Path::new("/opt/pdfium/lib"))
        );
        assert!(c.ocr.enabled);
        assert_eq!(c.ocr.provider, "ollama");
        assert_eq!(c.ocr.model, "llama3.2-vision");
        assert_eq!(c.server.host, "0.0.0.0");
        assert_eq!(c.server.max_upload_bytes(), 5 * 1024 * 1024);
    }

    #[test]
    fn load_reports_path_on_missing_file() {
        let err = AppConfig::load("/definitely/not/here/config.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("/definitely/not/here"));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let c = AppConfig::load(&path).unwrap();
        assert_eq!(c.ollama.model, "llama3");
    }

    #[test]
    fn surface_names() {
        assert_eq!(Surface::Terminal.to_string(), "terminal");
        assert_eq!(Surface::Web.as_str(), "web");
    }
}
