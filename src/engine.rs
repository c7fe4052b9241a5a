//! The PDF engine: one PDFium binding per process, owned by one thread.
//!
//! ## Threading
//!
//! PDFium is bound once per process and is never called from two threads at
//! once. [`PdfEngine::load`] binds the library on a thread named
//! `pdf-engine` which then owns it for the rest of the process and serves
//! requests in arrival order. The async side holds a cheap, cloneable
//! [`PdfEngine`] handle and awaits a `oneshot` reply; tokio worker threads
//! never block inside PDFium.
//!
//! ## Library resolution
//!
//! Candidates are tried in order and the first that binds wins:
//!
//! 1. `[engine] library_path` from the config file
//! 2. `PDFIUM_LIB_PATH`
//! 3. the directory containing the running executable
//! 4. the system library search path
//!
//! A candidate that names a directory is expanded to the platform library
//! name inside it (`libpdfium.so`, `libpdfium.dylib`, `pdfium.dll`).

use crate::config::EngineConfig;
use crate::error::{ConvertError, EngineError};
use crate::extraction::{DocumentMetadata, ExtractedImage};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Environment variable naming the PDFium library or its directory.
pub const PDFIUM_LIB_PATH_VAR: &str = "PDFIUM_LIB_PATH";

type Reply<T> = oneshot::Sender<Result<T, ConvertError>>;

enum Job {
    Extract {
        path: PathBuf,
        reply: Reply<RawDocument>,
    },
    Render {
        path: PathBuf,
        pages: Vec<usize>,
        max_pixels: u32,
        reply: Reply<Vec<RenderedPage>>,
    },
    Inspect {
        path: PathBuf,
        reply: Reply<DocumentMetadata>,
    },
}

/// Uncleaned engine output for one document.
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// Text layer of each page, in page order, exactly as PDFium returned it.
    pub pages: Vec<String>,
    pub images: Vec<ExtractedImage>,
    /// Info-dictionary fields, page count and version. Per-page statistics
    /// are left for the converter to fill in.
    pub metadata: DocumentMetadata,
}

/// A page rasterised for OCR.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// 1-based page number.
    pub page: usize,
    pub image: DynamicImage,
}

/// Handle to the engine thread.
#[derive(Debug, Clone)]
pub struct PdfEngine {
    jobs: mpsc::UnboundedSender<Job>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Job::Extract { path, .. } => write!(f, "Extract({})", path.display()),
            Job::Render { path, pages, .. } => {
                write!(f, "Render({}, {:?})", path.display(), pages)
            }
            Job::Inspect { path, .. } => write!(f, "Inspect({})", path.display()),
        }
    }
}

impl PdfEngine {
    /// Bind PDFium and start the engine thread.
    ///
    /// Blocks until the binding succeeded or every candidate failed. Call it
    /// once at startup; clone the handle for every consumer.
    pub fn load(config: &EngineConfig) -> Result<Self, EngineError> {
        let candidates = library_candidates(
            config.library_path.as_deref(),
            std::env::var_os(PDFIUM_LIB_PATH_VAR).map(PathBuf::from),
            std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf)),
        );

        let (jobs, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel(1);

        std::thread::Builder::new()
            .name("pdf-engine".into())
            .spawn(move || {
                let pdfium = match bind(&candidates) {
                    Ok(pdfium) => {
                        let _ = ready_tx.send(Ok(()));
                        pdfium
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                serve(&pdfium, rx);
                debug!("pdf engine thread exiting");
            })
            .map_err(EngineError::Spawn)?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { jobs }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(EngineError::Stopped),
        }
    }

    /// Text layer, embedded images and metadata of the PDF at `path`.
    pub async fn extract(&self, path: &Path) -> Result<RawDocument, ConvertError> {
        let path = path.to_path_buf();
        self.request(|reply| Job::Extract { path, reply }).await
    }

    /// Rasterise the given 1-based `pages`, longest edge at most
    /// `max_pixels`. Out-of-range pages are skipped.
    pub async fn render_pages(
        &self,
        path: &Path,
        pages: Vec<usize>,
        max_pixels: u32,
    ) -> Result<Vec<RenderedPage>, ConvertError> {
        let path = path.to_path_buf();
        self.request(|reply| Job::Render {
            path,
            pages,
            max_pixels,
            reply,
        })
        .await
    }

    /// Metadata only; no text is read.
    pub async fn inspect(&self, path: &Path) -> Result<DocumentMetadata, ConvertError> {
        let path = path.to_path_buf();
        self.request(|reply| Job::Inspect { path, reply }).await
    }

    async fn request<T>(&self, job: impl FnOnce(Reply<T>) -> Job) -> Result<T, ConvertError> {
        let (tx, rx) = oneshot::channel();
        self.jobs.send(job(tx)).map_err(|_| EngineError::Stopped)?;
        rx.await.map_err(|_| EngineError::Stopped)?
    }
}

// ── Binding ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Candidate {
    Library(PathBuf),
    System,
}

fn library_candidates(
    configured: Option<&Path>,
    from_env: Option<PathBuf>,
    exe_dir: Option<PathBuf>,
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = configured
        .map(Path::to_path_buf)
        .into_iter()
        .chain(from_env.filter(|p| !p.as_os_str().is_empty()))
        .chain(exe_dir)
        .map(Candidate::Library)
        .collect();
    candidates.push(Candidate::System);
    candidates
}

fn resolve_library(path: &Path) -> PathBuf {
    if path.is_dir() {
        PathBuf::from(Pdfium::pdfium_platform_library_name_at_path(path))
    } else {
        path.to_path_buf()
    }
}

fn bind(candidates: &[Candidate]) -> Result<Pdfium, EngineError> {
    let mut failures = Vec::new();
    for candidate in candidates {
        let attempt = match candidate {
            Candidate::Library(path) => {
                let lib = resolve_library(path);
                Pdfium::bind_to_library(&lib)
                    .map_err(|e| format!("{}: {:?}", lib.display(), e))
                    .map(|b| (b, lib.display().to_string()))
            }
            Candidate::System => Pdfium::bind_to_system_library()
                .map_err(|e| format!("system library: {:?}", e))
                .map(|b| (b, "system library".to_string())),
        };
        match attempt {
            Ok((bindings, source)) => {
                info!("PDFium bound from {}", source);
                return Ok(Pdfium::new(bindings));
            }
            Err(reason) => {
                debug!("PDFium candidate failed: {}", reason);
                failures.push(reason);
            }
        }
    }
    Err(EngineError::Bind(failures.join("; ")))
}

// ── Engine thread ────────────────────────────────────────────────────────

fn serve(pdfium: &Pdfium, mut rx: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = rx.blocking_recv() {
        debug!(?job, "pdf engine job");
        match job {
            Job::Extract { path, reply } => {
                let _ = reply.send(extract_blocking(pdfium, &path));
            }
            Job::Render {
                path,
                pages,
                max_pixels,
                reply,
            } => {
                let _ = reply.send(render_blocking(pdfium, &path, &pages, max_pixels));
            }
            Job::Inspect { path, reply } => {
                let _ = reply.send(inspect_blocking(pdfium, &path));
            }
        }
    }
}

/// Reject anything that does not start with `%PDF` before PDFium sees it.
fn check_magic(path: &Path) -> Result<(), ConvertError> {
    let mut file = std::fs::File::open(path).map_err(|_| ConvertError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    let mut magic = [0u8; 4];
    let read = file.read(&mut magic).map_err(|e| ConvertError::CorruptPdf {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    if read < 4 || &magic != b"%PDF" {
        return Err(ConvertError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

fn open<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, ConvertError> {
    check_magic(path)?;
    pdfium.load_pdf_from_file(path, None).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            ConvertError::PasswordRequired {
                path: path.to_path_buf(),
            }
        } else {
            ConvertError::CorruptPdf {
                path: path.to_path_buf(),
                detail: err_str,
            }
        }
    })
}

fn read_metadata(document: &PdfDocument<'_>) -> DocumentMetadata {
    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().trim().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
        modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
        ..Default::default()
    }
}

fn extract_blocking(pdfium: &Pdfium, path: &Path) -> Result<RawDocument, ConvertError> {
    let document = open(pdfium, path)?;
    let metadata = read_metadata(&document);
    info!("PDF loaded: {} pages", metadata.page_count);

    let mut pages = Vec::with_capacity(metadata.page_count);
    let mut images = Vec::new();

    for (idx, page) in document.pages().iter().enumerate() {
        let page_num = idx + 1;
        let text = page
            .text()
            .map_err(|e| ConvertError::PageFailed {
                page: page_num,
                detail: format!("{:?}", e),
            })?
            .all();
        debug!("Page {}: {} chars in text layer", page_num, text.len());
        pages.push(text);

        let mut index = 0;
        for object in page.objects().iter() {
            let Some(image_object) = object.as_image_object() else {
                continue;
            };
            match image_object.get_raw_image() {
                Ok(image) => match encode_png(&image) {
                    Ok(png) => {
                        images.push(ExtractedImage {
                            page: page_num,
                            index,
                            width: image.width(),
                            height: image.height(),
                            png,
                        });
                        index += 1;
                    }
                    Err(e) => warn!("Page {}: image {} not encodable: {}", page_num, index, e),
                },
                Err(e) => warn!("Page {}: image {} not decodable: {:?}", page_num, index, e),
            }
        }
    }

    Ok(RawDocument {
        pages,
        images,
        metadata,
    })
}

fn render_blocking(
    pdfium: &Pdfium,
    path: &Path,
    page_numbers: &[usize],
    max_pixels: u32,
) -> Result<Vec<RenderedPage>, ConvertError> {
    let document = open(pdfium, path)?;
    let pages = document.pages();
    let total_pages = pages.len() as usize;

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut results = Vec::with_capacity(page_numbers.len());
    for &page_num in page_numbers {
        if page_num == 0 || page_num > total_pages {
            warn!(
                "Skipping page {} (out of range, total={})",
                page_num, total_pages
            );
            continue;
        }

        let page = pages
            .get((page_num - 1) as u16)
            .map_err(|e| ConvertError::PageFailed {
                page: page_num,
                detail: format!("{:?}", e),
            })?;
        let bitmap =
            page.render_with_config(&render_config)
                .map_err(|e| ConvertError::PageFailed {
                    page: page_num,
                    detail: format!("{:?}", e),
                })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            page_num,
            image.width(),
            image.height()
        );
        results.push(RenderedPage {
            page: page_num,
            image,
        });
    }
    Ok(results)
}

fn inspect_blocking(pdfium: &Pdfium, path: &Path) -> Result<DocumentMetadata, ConvertError> {
    let document = open(pdfium, path)?;
    Ok(read_metadata(&document))
}

/// Lossless PNG encoding of a decoded image.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}
