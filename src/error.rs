//! Error types for the invoice-analyst library.
//!
//! Each collaborator owns its error enum so callers can match on the failure
//! that actually happened:
//!
//! * [`ConfigError`]: the config file is missing, malformed or incomplete.
//!   Fatal at startup.
//! * [`EngineError`]: the PDFium library could not be bound, or the engine
//!   thread has gone away. Fatal at startup.
//! * [`ConvertError`]: one document could not be converted to text.
//! * [`ChatError`]: the chat endpoint rejected the request or the fragment
//!   stream broke off.
//!
//! [`InvoiceError`] aggregates the per-request failures. Its `Display` text is
//! what a user sees in the error banner, so variants render the underlying
//! message verbatim.

use std::path::PathBuf;
use thiserror::Error;

/// The configuration file could not be turned into an [`crate::AppConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read at all.
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or is missing a required key
    /// (`ollama.host`, `ollama.model`).
    #[error("Invalid config file '{path}': {detail}")]
    Parse { path: PathBuf, detail: String },

    /// Parsed, but a value is unusable.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Failures of the PDF engine itself, independent of any single document.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No candidate pdfium library could be loaded.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set `engine.library_path` in the config file or PDFIUM_LIB_PATH=/path/to/libpdfium,\n\
or place the platform library next to the executable.\n"
    )]
    Bind(String),

    /// The dedicated engine thread could not be spawned.
    #[error("Failed to start PDF engine thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The engine thread exited; no further documents can be processed.
    #[error("PDF engine is no longer running")]
    Stopped,
}

/// A document could not be converted to text.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The staged file vanished before the engine could open it.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// The bytes do not start with the `%PDF` magic.
    #[error("File is not a valid PDF: '{path}' (first bytes: {magic:?})")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The PDF is encrypted with a user password.
    #[error("PDF '{path}' is encrypted and requires a password")]
    PasswordRequired { path: PathBuf },

    /// pdfium could not parse the document.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// A page could not be read or rendered.
    #[error("Page {page} could not be processed: {detail}")]
    PageFailed { page: usize, detail: String },

    /// The OCR vision provider could not be set up.
    #[error("OCR provider '{provider}' is not configured: {hint}")]
    OcrUnavailable { provider: String, hint: String },

    /// The engine is gone.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The chat collaborator failed before or during streaming.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The HTTP client could not be built.
    #[error("Failed to build chat client: {0}")]
    Client(String),

    /// The endpoint could not be reached, or the connection dropped.
    #[error("Could not reach chat endpoint '{url}': {detail}")]
    Transport { url: String, detail: String },

    /// The endpoint answered with a non-success status.
    #[error("Chat endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The model server reported an error inside the stream.
    #[error("Chat model reported an error: {0}")]
    Api(String),

    /// A stream line was not valid JSON.
    #[error("Malformed chat stream line: {0}")]
    Malformed(String),
}

/// Any failure that ends one analysis request.
///
/// Rendered to the user as `Error processing invoice: {self}`.
#[derive(Debug, Error)]
pub enum InvoiceError {
    /// The upload could not be written to its temporary file.
    #[error("Could not stage upload: {0}")]
    Staging(#[source] std::io::Error),

    #[error(transparent)]
    Convert(#[from] ConvertError),

    /// The extraction could not be serialised into the prompt.
    #[error("Could not build analysis prompt: {0}")]
    Prompt(#[from] serde_json::Error),

    #[error(transparent)]
    Chat(#[from] ChatError),
}
