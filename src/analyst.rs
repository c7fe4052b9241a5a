//! The orchestrator: one uploaded invoice in, one streamed analysis out.
//!
//! ```text
//! Upload
//!  │
//!  ├─ 1. Stage    write bytes to a unique invoice-*.pdf
//!  ├─ 2. Convert  DocumentConverter (PDFium, optional OCR)
//!  ├─ 3. Classify Extracted │ Empty │ Failed
//!  ├─ 4. Prompt   embed {"invoice_details", "metadata"} in the template
//!  ├─ 5. Chat     ChatClient::stream_chat, one user message
//!  ├─ 6. Render   append each fragment, repaint the buffer
//!  └─ 7. Release  delete the staged file, clear the spinner
//! ```
//!
//! Every failure is terminal for the request: it is shown once in the error
//! banner and returned as [`AnalysisOutcome::Failed`]. Nothing is retried and
//! nothing propagates to the caller as an `Err`.

use crate::chat::{ChatClient, Message};
use crate::converter::DocumentConverter;
use crate::display::AnalysisDisplay;
use crate::error::InvoiceError;
use crate::extraction::{ConversionOutcome, Extraction};
use crate::prompts::build_analysis_prompt;
use crate::upload::{StagedUpload, Upload};
use futures::StreamExt;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Spinner text while the upload is being processed.
pub const PROCESSING_MESSAGE: &str = "Processing invoice...";
/// Banner shown once text has been extracted.
pub const SUCCESS_MESSAGE: &str = "Invoice processed successfully!";
/// Banner shown when the document holds no text.
pub const EMPTY_MESSAGE: &str = "Empty file. Could not process.";

/// Banner shown for any other failure.
pub fn error_message(err: &InvoiceError) -> String {
    format!("Error processing invoice: {err}")
}

/// How one analysis ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    /// The model's full response and the fragments it arrived in.
    Completed { text: String, fragments: usize },
    /// No text was extracted; the chat endpoint was not called.
    EmptyDocument,
    /// The request failed; `message` is what the error banner showed.
    Failed { message: String },
}

impl AnalysisOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, AnalysisOutcome::Completed { .. })
    }
}

enum Halt {
    Empty,
    Failed(InvoiceError),
}

impl From<InvoiceError> for Halt {
    fn from(e: InvoiceError) -> Self {
        Halt::Failed(e)
    }
}

/// Wires a converter and a chat client together for each upload.
///
/// Both collaborators are constructed once at startup and shared read-only
/// across requests.
pub struct InvoiceAnalyst<C, L> {
    converter: C,
    chat: L,
    temp_dir: Option<PathBuf>,
}

impl<C, L> InvoiceAnalyst<C, L>
where
    C: DocumentConverter,
    L: ChatClient,
{
    pub fn new(converter: C, chat: L) -> Self {
        Self {
            converter,
            chat,
            temp_dir: None,
        }
    }

    /// Stage uploads in `dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn converter(&self) -> &C {
        &self.converter
    }

    /// Run one analysis, reporting to `display` as it goes.
    pub async fn analyze(&self, upload: Upload, display: &dyn AnalysisDisplay) -> AnalysisOutcome {
        info!(filename = %upload.filename, bytes = upload.bytes.len(), "analysing invoice");
        display.on_processing_start(&upload.filename);

        let outcome = match StagedUpload::create(&upload.bytes, self.temp_dir.as_deref()) {
            Ok(staged) => {
                let result = self.run(&staged, display).await;
                if let Err(e) = staged.release() {
                    warn!("temporary file not removed: {}", e);
                }
                result
            }
            Err(e) => Err(Halt::Failed(InvoiceError::Staging(e))),
        };

        let outcome = match outcome {
            Ok((text, fragments)) => {
                info!(fragments, chars = text.len(), "analysis complete");
                AnalysisOutcome::Completed { text, fragments }
            }
            Err(Halt::Empty) => {
                warn!(filename = %upload.filename, "no text extracted");
                display.on_error(EMPTY_MESSAGE);
                AnalysisOutcome::EmptyDocument
            }
            Err(Halt::Failed(e)) => {
                error!(filename = %upload.filename, "analysis failed: {}", e);
                let message = error_message(&e);
                display.on_error(&message);
                AnalysisOutcome::Failed { message }
            }
        };

        display.on_processing_end();
        outcome
    }

    async fn run(
        &self,
        staged: &StagedUpload,
        display: &dyn AnalysisDisplay,
    ) -> Result<(String, usize), Halt> {
        let extraction = match ConversionOutcome::from(self.converter.convert(staged.path()).await)
        {
            ConversionOutcome::Extracted(extraction) => extraction,
            ConversionOutcome::Empty(_) => return Err(Halt::Empty),
            ConversionOutcome::Failed(e) => return Err(InvoiceError::from(e).into()),
        };

        display.on_success(SUCCESS_MESSAGE);
        Ok(self.stream_analysis(&extraction, display).await?)
    }

    async fn stream_analysis(
        &self,
        extraction: &Extraction,
        display: &dyn AnalysisDisplay,
    ) -> Result<(String, usize), InvoiceError> {
        let prompt = build_analysis_prompt(extraction)?;
        let mut stream = self.chat.stream_chat(vec![Message::user(prompt)]).await?;

        let mut buffer = String::new();
        let mut fragments = 0usize;
        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            buffer.push_str(&fragment);
            fragments += 1;
            display.render(&fragment, &buffer);
        }
        Ok((buffer, fragments))
    }
}
