//! The conversion collaborator: PDF path in, [`Extraction`] out.
//!
//! [`DocumentConverter`] is the seam the orchestrator depends on. The real
//! implementation, [`PdfiumConverter`], holds a [`PdfEngine`] handle that
//! was bound once at startup and, optionally, a [`VisionOcr`] for pages
//! without a text layer. Tests swap in stubs.

use crate::engine::PdfEngine;
use crate::error::ConvertError;
use crate::extraction::{DocumentMetadata, Extraction};
use crate::ocr::VisionOcr;
use crate::text::{clean_page_text, join_pages};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Turns a PDF on disk into text, images and metadata.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn convert(&self, path: &Path) -> Result<Extraction, ConvertError>;
}

#[async_trait]
impl<T: DocumentConverter + ?Sized> DocumentConverter for Arc<T> {
    async fn convert(&self, path: &Path) -> Result<Extraction, ConvertError> {
        (**self).convert(path).await
    }
}

/// PDFium text layer, with optional vision OCR for blank pages.
#[derive(Debug, Clone)]
pub struct PdfiumConverter {
    engine: PdfEngine,
    ocr: Option<VisionOcr>,
}

impl PdfiumConverter {
    pub fn new(engine: PdfEngine) -> Self {
        Self { engine, ocr: None }
    }

    /// Transcribe pages with no text layer through `ocr`.
    pub fn with_ocr(mut self, ocr: VisionOcr) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn engine(&self) -> &PdfEngine {
        &self.engine
    }
}

#[async_trait]
impl DocumentConverter for PdfiumConverter {
    async fn convert(&self, path: &Path) -> Result<Extraction, ConvertError> {
        let raw = self.engine.extract(path).await?;

        let mut pages: Vec<String> = raw.pages.iter().map(|p| clean_page_text(p)).collect();
        let mut metadata = raw.metadata;

        if let Some(ocr) = &self.ocr {
            let blank: Vec<usize> = pages
                .iter()
                .enumerate()
                .filter(|(_, text)| text.is_empty())
                .map(|(idx, _)| idx + 1)
                .collect();
            match ocr.transcribe_pages(&self.engine, path, blank).await {
                Ok(transcribed) => apply_transcriptions(&mut pages, &mut metadata, transcribed),
                Err(e) => warn!("OCR skipped for {}: {}", path.display(), e),
            }
        }

        metadata.page_char_counts = pages.iter().map(|p| p.chars().count()).collect();
        metadata.image_count = raw.images.len();

        let text = join_pages(&pages);
        info!(
            "Converted {}: {} pages, {} chars, {} images",
            path.display(),
            metadata.page_count,
            text.chars().count(),
            raw.images.len()
        );
        debug!(?metadata, "extraction metadata");

        Ok(Extraction {
            text,
            images: raw.images,
            metadata,
        })
    }
}

/// Put transcribed text into the blank slots of `pages` and record which
/// 1-based page numbers came from OCR. Numbers outside the document are
/// dropped.
fn apply_transcriptions(
    pages: &mut [String],
    metadata: &mut DocumentMetadata,
    transcribed: Vec<(usize, String)>,
) {
    for (page, text) in transcribed {
        let slot = page.checked_sub(1).and_then(|idx| pages.get_mut(idx));
        match slot {
            Some(slot) => {
                *slot = text;
                metadata.ocr_pages.push(page);
            }
            None => debug!("OCR returned page {} outside the document", page),
        }
    }
}
