//! # invoice-analyst
//!
//! Upload an invoice PDF, extract its text with PDFium, and stream an LLM's
//! table, summary and financial-risk analysis back as it is generated.
//!
//! ## Why this crate?
//!
//! Reading an invoice is easy for a person and tedious at volume. This crate
//! does the mechanical part: it pulls the text layer (and, for scans, a
//! vision-model transcription) out of the PDF, wraps it in a fixed analysis
//! prompt, and sends it to a local Ollama model. The answer is streamed to
//! the terminal or the browser fragment by fragment.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Upload
//!  │
//!  ├─ 1. Stage    bytes → unique invoice-*.pdf           (upload)
//!  ├─ 2. Extract  PDFium on its own thread                (engine)
//!  ├─ 3. OCR      vision model for blank pages, optional  (ocr)
//!  ├─ 4. Clean    line endings, invisible chars, blanks   (text)
//!  ├─ 5. Prompt   {"invoice_details", "metadata"} JSON    (prompts)
//!  ├─ 6. Chat     Ollama /api/chat, NDJSON stream         (chat)
//!  └─ 7. Display  spinner, banners, growing text          (display)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use invoice_analyst::{
//!     AppConfig, InvoiceAnalyst, NoopDisplay, OllamaChatClient, PdfEngine, PdfiumConverter,
//!     Upload,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load("config.toml")?;
//!     let engine = PdfEngine::load(&config.engine)?;
//!     let analyst = InvoiceAnalyst::new(
//!         PdfiumConverter::new(engine),
//!         OllamaChatClient::new(&config.ollama)?,
//!     );
//!
//!     let upload = Upload::from_path("invoice.pdf".as_ref())?;
//!     let outcome = analyst.analyze(upload, &NoopDisplay).await;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | The `invoice-analyst` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `web`   | on      | The upload page and SSE endpoint (axum + tower-http) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyst;
pub mod chat;
pub mod config;
pub mod converter;
pub mod display;
pub mod engine;
pub mod error;
pub mod extraction;
pub mod ocr;
pub mod prompts;
pub mod text;
pub mod upload;
#[cfg(feature = "web")]
pub mod web;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyst::{AnalysisOutcome, InvoiceAnalyst};
pub use chat::{ChatClient, FragmentStream, Message, OllamaChatClient, Role};
pub use config::{AppConfig, EngineConfig, OcrConfig, OllamaConfig, ServerConfig, Surface};
pub use converter::{DocumentConverter, PdfiumConverter};
pub use display::{AnalysisDisplay, ChannelDisplay, DisplayEvent, NoopDisplay};
pub use engine::PdfEngine;
pub use error::{ChatError, ConfigError, ConvertError, EngineError, InvoiceError};
pub use extraction::{ConversionOutcome, DocumentMetadata, ExtractedImage, Extraction};
pub use ocr::VisionOcr;
pub use upload::{StagedUpload, Upload};
#[cfg(feature = "web")]
pub use web::InvoiceServer;
