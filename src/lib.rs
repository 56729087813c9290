//! # illustra
//!
//! Turn a PDF and a plain-text summary into an illustrated document: the
//! PDF's diagrams are extracted, deduplicated, described by a vision model,
//! and woven into the summary at contextually correct positions.
//!
//! ## Why this crate?
//!
//! Hand-written summaries lose the figures that carried half the original
//! document's meaning. Re-inserting them by hand means hunting through the
//! source PDF, cropping screenshots, and guessing where each one belongs.
//! This crate automates the whole loop: it finds the content images (while
//! ignoring header logos and footer decorations), reassembles diagrams that
//! arrive as vertical segments, asks a vision model what each one shows, and
//! asks a text model where in *your* summary that content is discussed.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF + summary.md
//!  │
//!  ├─ 1. HTML_CONVERT     serialise the PDF body (text + embedded images)
//!  ├─ 2. IMAGE_CAPTURE    layout analysis, region crops, unification, dedup
//!  ├─ 3. VISION_DESCRIBE  ≤10-word description per unique image
//!  ├─ 4. CONTEXTUAL_PLACE fold each [IMAGE_ID] tag into the summary
//!  └─ 5. FINAL_ASSEMBLE   illustrated HTML document + cleanup manifest
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use illustra::{illustrate, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credential read from GEMINI_API_KEY unless set on the config
//!     let config = PipelineConfig::default();
//!     let output = illustrate("paper.pdf", "summary.md", "illustrated.html", &config).await?;
//!     eprintln!(
//!         "{} images described, {} tags placed",
//!         output.stats.images_described, output.stats.tags_placed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `illustra` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! illustra = { version = "0.2", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifacts;
pub mod config;
pub mod error;
pub mod illustrate;
pub mod oracle;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use artifacts::{
    CleanupManifest, CoordinateMap, CoordinateMapEntry, DescriptionMap, ImageAssetRecord,
    ImageIndex, SourcePage, DESCRIPTION_FAILURE_SENTINEL,
};
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::{IllustraError, ItemError};
pub use illustrate::{illustrate, illustrate_sync, PipelineOutput, PipelineStats};
pub use oracle::{GeminiOracle, GenerativeOracle, OracleError, RemoteFile};
pub use progress::{NoopStageProgress, ProgressCallback, ProgressEvent, StageProgressCallback};
