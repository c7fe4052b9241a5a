//! Vision transcription for pages that have no text layer.
//!
//! Scanned invoices are images wrapped in a PDF: PDFium finds no text and the
//! analysis would stop at "Empty file". When `[ocr] enabled = true` the
//! converter renders those pages and asks a vision model to read them.
//!
//! ## Failure policy
//!
//! A page that cannot be transcribed stays empty and is logged. It never
//! fails the document: if every page fails, the orchestrator sees an empty
//! extraction and reports it as such.

use crate::config::{ocr_workers, OcrConfig};
use crate::engine::{PdfEngine, RenderedPage};
use crate::error::ConvertError;
use crate::prompts::OCR_SYSTEM_PROMPT;
use crate::text::clean_transcription;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A vision model that turns page images into text.
#[derive(Clone)]
pub struct VisionOcr {
    provider: Arc<dyn LLMProvider>,
    config: OcrConfig,
}

impl std::fmt::Debug for VisionOcr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionOcr")
            .field("provider", &self.config.provider)
            .field("model", &self.config.model)
            .finish()
    }
}

impl VisionOcr {
    /// Build the provider named in `[ocr]`. API keys are read from the
    /// environment by edgequake-llm.
    pub fn from_config(config: &OcrConfig) -> Result<Self, ConvertError> {
        let provider = ProviderFactory::create_llm_provider(&config.provider, &config.model)
            .map_err(|e| ConvertError::OcrUnavailable {
                provider: config.provider.clone(),
                hint: format!("{e}"),
            })?;
        Ok(Self::with_provider(provider, config.clone()))
    }

    /// Use a pre-built provider.
    pub fn with_provider(provider: Arc<dyn LLMProvider>, config: OcrConfig) -> Self {
        Self { provider, config }
    }

    /// Render and transcribe the given 1-based `pages` of `path`.
    ///
    /// Returns `(page, text)` for every page that produced non-empty text,
    /// sorted by page number.
    pub async fn transcribe_pages(
        &self,
        engine: &PdfEngine,
        path: &Path,
        pages: Vec<usize>,
    ) -> Result<Vec<(usize, String)>, ConvertError> {
        if pages.is_empty() {
            return Ok(Vec::new());
        }
        info!("OCR: transcribing {} page(s) without a text layer", pages.len());

        let rendered = engine
            .render_pages(path, pages, self.config.max_rendered_pixels)
            .await?;

        let workers = ocr_workers();
        let mut results: Vec<(usize, String)> = stream::iter(rendered)
            .map(|page| self.transcribe(page))
            .buffer_unordered(workers)
            .filter_map(|r| async move { r })
            .collect()
            .await;

        results.sort_by_key(|(page, _)| *page);
        Ok(results)
    }

    async fn transcribe(&self, rendered: RenderedPage) -> Option<(usize, String)> {
        let page = rendered.page;
        let image = match encode_page(&rendered.image) {
            Ok(image) => image,
            Err(e) => {
                warn!("OCR page {}: encoding failed: {}", page, e);
                return None;
            }
        };

        let messages = vec![
            ChatMessage::system(OCR_SYSTEM_PROMPT),
            ChatMessage::user_with_images("", vec![image]),
        ];
        let options = CompletionOptions {
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
            ..Default::default()
        };

        let start = Instant::now();
        match self.provider.chat(&messages, Some(&options)).await {
            Ok(response) => {
                debug!(
                    "OCR page {}: {} input tokens, {} output tokens, {:?}",
                    page,
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                let text = clean_transcription(&response.content);
                if text.is_empty() {
                    warn!("OCR page {}: model returned no text", page);
                    None
                } else {
                    Some((page, text))
                }
            }
            Err(e) => {
                warn!("OCR page {}: transcription failed: {}", page, e);
                None
            }
        }
    }
}

/// Base64 PNG wrapped for a vision request.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let png = crate::engine::encode_png(img)?;
    let b64 = STANDARD.encode(&png);
    debug!("Encoded page image → {} bytes base64", b64.len());
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}
