//! The conversion-engine boundary.
//!
//! The engine is the expensive, opaque collaborator of the pipeline: it
//! consumes one local document and produces extracted text plus metadata,
//! or fails. Everything the rest of the crate knows about it is the
//! [`ConversionEngine`] trait; the production implementation binds pdfium.
//!
//! ## Loading discipline
//!
//! Construction dominates startup cost (binding the shared library and its
//! initialisation), so an engine is loaded **once per minibatch** and then
//! reused for every document in it — never once per document. Instances are
//! not assumed safe for concurrent use: each worker loads its own through
//! an [`EngineLoader`] and the instance never leaves that worker's thread,
//! which is why the trait carries no `Send`/`Sync` bound.

use crate::error::Corpus2MdError;
use serde_json::json;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Per-document engine failure, mapped into
/// [`crate::error::DocError::Engine`] at the converter boundary.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The document could not be opened or parsed.
    #[error("failed to open document: {0}")]
    Open(String),

    /// The document opened but text extraction failed.
    #[error("text extraction failed: {0}")]
    Extract(String),
}

/// The result of a full conversion: extracted text plus document metadata.
#[derive(Debug, Clone)]
pub struct ConvertedDocument {
    pub text: String,
    pub metadata: serde_json::Value,
}

/// One loaded conversion engine.
///
/// Owned exclusively by one minibatch worker for the lifetime of its
/// minibatch; not shared, not sent across threads.
pub trait ConversionEngine {
    /// Cheap pre-check: length of the text already embedded in the
    /// document, without running the full conversion. Used by the quality
    /// gate — documents with little embedded text are usually scans that
    /// were never OCRed properly and convert badly.
    fn embedded_text_length(&self, document: &Path) -> Result<usize, EngineError>;

    /// Full conversion of one local document.
    fn convert(&self, document: &Path) -> Result<ConvertedDocument, EngineError>;
}

/// Constructs engines; shared across workers, each of which calls
/// [`EngineLoader::load`] on its own thread.
pub trait EngineLoader: Send + Sync {
    /// Load a fresh engine instance. Failure is fatal to the calling
    /// worker: it happens before any document is touched.
    fn load(&self) -> Result<Box<dyn ConversionEngine>, Corpus2MdError>;
}

// ── pdfium implementation ────────────────────────────────────────────────

use pdfium_render::prelude::*;
use std::path::PathBuf;

/// Loader for the pdfium-backed engine.
///
/// Binding the shared library is the expensive step this crate's minibatch
/// sizing exists to amortize.
#[derive(Debug, Clone, Default)]
pub struct PdfiumEngineLoader {
    /// Explicit path to the pdfium shared library. When `None`, the
    /// system library search path is used.
    pub library_path: Option<PathBuf>,
}

impl EngineLoader for PdfiumEngineLoader {
    fn load(&self) -> Result<Box<dyn ConversionEngine>, Corpus2MdError> {
        let bindings = match &self.library_path {
            Some(path) => Pdfium::bind_to_library(path.to_string_lossy().to_string()),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| Corpus2MdError::EngineLoad(format!("{e:?}")))?;

        Ok(Box::new(PdfiumEngine {
            pdfium: Pdfium::new(bindings),
        }))
    }
}

/// Engine backed by the pdfium library.
pub struct PdfiumEngine {
    pdfium: Pdfium,
}

impl PdfiumEngine {
    fn open(&self, document: &Path) -> Result<PdfDocument<'_>, EngineError> {
        self.pdfium
            .load_pdf_from_file(document, None)
            .map_err(|e| EngineError::Open(format!("{e:?}")))
    }
}

impl ConversionEngine for PdfiumEngine {
    fn embedded_text_length(&self, document: &Path) -> Result<usize, EngineError> {
        let doc = self.open(document)?;
        let mut total = 0usize;
        for page in doc.pages().iter() {
            // A page whose text layer cannot be read counts as zero rather
            // than failing the pre-check; the gate only needs a lower bound.
            total += page.text().map(|t| t.all().len()).unwrap_or(0);
        }
        debug!("embedded text length: {} chars", total);
        Ok(total)
    }

    fn convert(&self, document: &Path) -> Result<ConvertedDocument, EngineError> {
        let doc = self.open(document)?;
        let pages = doc.pages();
        let mut parts: Vec<String> = Vec::with_capacity(pages.len() as usize);

        for page in pages.iter() {
            let text = page
                .text()
                .map_err(|e| EngineError::Extract(format!("{e:?}")))?;
            parts.push(text.all());
        }

        let metadata = doc.metadata();
        let get_tag = |tag: PdfDocumentMetadataTagType| -> Option<String> {
            metadata.get(tag).and_then(|t| {
                let v = t.value().to_string();
                if v.is_empty() {
                    None
                } else {
                    Some(v)
                }
            })
        };

        let metadata = json!({
            "title": get_tag(PdfDocumentMetadataTagType::Title),
            "author": get_tag(PdfDocumentMetadataTagType::Author),
            "subject": get_tag(PdfDocumentMetadataTagType::Subject),
            "creator": get_tag(PdfDocumentMetadataTagType::Creator),
            "producer": get_tag(PdfDocumentMetadataTagType::Producer),
            "page_count": pages.len(),
            "pdf_version": format!("{:?}", doc.version()),
        });

        Ok(ConvertedDocument {
            text: parts.join("\n\n"),
            metadata,
        })
    }
}
