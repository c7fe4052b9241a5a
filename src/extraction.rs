//! The result of converting one PDF: text, embedded images and metadata.

use crate::error::ConvertError;
use serde::{Deserialize, Serialize};

/// Everything the conversion step produced for one document.
///
/// Built once per upload, consumed once to build the analysis prompt.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Full document text, pages separated by a blank line.
    pub text: String,

    /// Raster images embedded in the document, in page order.
    pub images: Vec<ExtractedImage>,

    pub metadata: DocumentMetadata,
}

impl Extraction {
    /// True when there is nothing but whitespace to analyse.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// One raster image found on a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedImage {
    /// 1-based page number.
    pub page: usize,
    /// 0-based position among the images of that page.
    pub index: usize,
    pub width: u32,
    pub height: u32,
    /// PNG-encoded pixels. Not serialised: only the dimensions go into the
    /// prompt.
    #[serde(skip)]
    pub png: Vec<u8>,
}

/// Document-level metadata from the PDF info dictionary plus extraction
/// statistics.
///
/// This is the `metadata` object embedded in the analysis prompt, so empty
/// fields are omitted from the JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification_date: Option<String>,

    pub page_count: usize,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pdf_version: String,

    /// Characters of cleaned text per page, in page order.
    #[serde(default)]
    pub page_char_counts: Vec<usize>,

    /// 1-based numbers of pages whose text came from OCR.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ocr_pages: Vec<usize>,

    /// Number of embedded raster images across the document.
    #[serde(default)]
    pub image_count: usize,
}

/// Typed result of the conversion step, as seen by the orchestrator.
#[derive(Debug)]
pub enum ConversionOutcome {
    /// Non-blank text was extracted.
    Extracted(Extraction),
    /// The document opened but holds no text after trimming.
    Empty(DocumentMetadata),
    /// The converter failed.
    Failed(ConvertError),
}

impl From<Result<Extraction, ConvertError>> for ConversionOutcome {
    fn from(result: Result<Extraction, ConvertError>) -> Self {
        match result {
            Ok(extraction) if extraction.is_blank() => Self::Empty(extraction.metadata),
            Ok(extraction) => Self::Extracted(extraction),
            Err(e) => Self::Failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extraction(text: &str) -> Extraction {
        Extraction {
            text: text.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn whitespace_text_is_empty_outcome() {
        assert!(matches!(
            ConversionOutcome::from(Ok(extraction(" \n\t "))),
            ConversionOutcome::Empty(_)
        ));
        assert!(matches!(
            ConversionOutcome::from(Ok(extraction(""))),
            ConversionOutcome::Empty(_)
        ));
    }

    #[test]
    fn text_is_extracted_outcome() {
        match ConversionOutcome::from(Ok(extraction("Invoice #123"))) {
            ConversionOutcome::Extracted(e) => assert_eq!(e.text, "Invoice #123"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn error_is_failed_outcome() {
        let outcome = ConversionOutcome::from(Err(ConvertError::Internal("boom".into())));
        assert!(matches!(outcome, ConversionOutcome::Failed(_)));
    }

    #[test]
    fn metadata_json_omits_empty_fields() {
        let meta = DocumentMetadata {
            title: Some("INV-2024-001".into()),
            page_count: 1,
            page_char_counts: vec![42],
            ..Default::default()
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["title"], "INV-2024-001");
        assert_eq!(json["page_count"], 1);
        assert!(json.get("author").is_none());
        assert!(json.get("ocr_pages").is_none());
    }

    #[test]
    fn image_bytes_are_not_serialised() {
        let img = ExtractedImage {
            page: 1,
            index: 0,
            width: 120,
            height: 40,
            png: vec![0x89, b'P', b'N', b'G'],
        };
        let json = serde_json::to_value(&img).unwrap();
        assert_eq!(json["width"], 120);
        assert!(json.get("png").is_none());
    }
}
