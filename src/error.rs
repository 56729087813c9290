//! Error types for the illustra library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`IllustraError`] — **Fatal**: the pipeline run cannot proceed at all
//!   (missing input file, missing credential, zero extractable images,
//!   unreadable coordinate map). Returned as `Err(IllustraError)` from the
//!   top-level [`crate::illustrate`] entry point and aborts the run.
//!
//! * [`ItemError`] — **Non-fatal**: a single image failed (one capture region,
//!   one description call, one placement call, one unreadable segment) but all
//!   other images are fine. Recorded in the stage reports so callers can
//!   inspect partial success rather than losing the whole run to one image.
//!
//! Per-item failures never escalate to stage failures; stage failures always
//! escalate to run failure and emit a terminal negative-progress event.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the illustra library.
///
/// Image-level failures use [`ItemError`] and are stored in the stage reports
/// rather than propagated here.
#[derive(Debug, Error)]
pub enum IllustraError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Source PDF was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    PdfNotFound { path: PathBuf },

    /// Summary text file was not found at the given path.
    #[error("Summary file not found: '{path}'")]
    SummaryNotFound { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    // ── Artifact errors ───────────────────────────────────────────────────
    /// A required intermediate file (HTML body, coordinate map, description
    /// map) is missing or malformed.
    #[error("Unreadable pipeline artifact '{path}': {detail}")]
    UnreadableArtifact { path: PathBuf, detail: String },

    /// The HTML body extraction found no `<body>` element to scan.
    #[error("No <body> element found in '{path}'")]
    MissingHtmlBody { path: PathBuf },

    /// The extraction stages produced zero candidate images, so the vision
    /// phase has nothing to describe.
    #[error("No extractable images found in '{dir}' — nothing to describe")]
    NoImagesExtracted { dir: PathBuf },

    // ── Oracle errors ─────────────────────────────────────────────────────
    /// No API key was configured and no pre-built oracle was injected.
    #[error("Oracle credential missing.\nSet GEMINI_API_KEY or provide PipelineConfig::api_key.")]
    MissingCredential,

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy."
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single image.
///
/// Stored in stage reports ([`crate::pipeline::capture::CaptureReport`],
/// [`crate::pipeline::unify::UnifyReport`]) when one item fails. The stage
/// continues with the remaining items.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// A coordinate-map entry could not be rasterised (page out of range,
    /// degenerate rectangle).
    #[error("Region '{image_id}': capture failed: {detail}")]
    CaptureFailed { image_id: String, detail: String },

    /// The vision oracle failed for one image; a sentinel description is
    /// recorded instead.
    #[error("Image '{image_id}': description failed: {detail}")]
    DescriptionFailed { image_id: String, detail: String },

    /// The placement oracle failed for one tag; an error marker is appended
    /// to the summary buffer instead.
    #[error("Tag '{image_id}': placement failed: {detail}")]
    PlacementFailed { image_id: String, detail: String },

    /// One segment file in a unification group could not be loaded.
    #[error("Segment '{path}': unreadable: {detail}")]
    UnreadableSegment { path: String, detail: String },
}
