//! Pipeline stages for PDF illustration.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. switch the oracle backend) without touching
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! html ──▶ layout ──▶ capture ──▶ unify ──▶ extract ──▶ vision ──▶ place ──▶ assemble
//! (pdfium)  (geometry)  (crops)   (stitch)   (dedup)    (oracle)  (oracle)  (document)
//! ```
//!
//! 1. [`html`]    — serialise the PDF body to an intermediate HTML document
//! 2. [`layout`]  — partition each page into text/image blocks, mint stable
//!    image ids, and associate each image with its nearest following text
//! 3. [`capture`] — rasterise and crop every mapped region to a PNG; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 4. [`unify`]   — stitch multi-segment captures back into one canvas; must
//!    run before [`extract`] adds its sequentially numbered files
//! 5. [`extract`] — pull embedded images out of the HTML in document order,
//!    deduplicating by content hash and dropping decorative fragments
//! 6. [`vision`]  — describe each surviving image via the oracle; the first
//!    stage with network I/O
//! 7. [`place`]   — fold every description into the summary, one tag at a time
//! 8. [`assemble`] — materialise the tagged summary as the final document

use pdfium_render::prelude::Pdfium;

use crate::error::IllustraError;

pub mod assemble;
pub mod capture;
pub mod extract;
pub mod html;
pub mod layout;
pub mod place;
pub mod unify;
pub mod vision;

/// Bind to a pdfium shared library: the directory named by
/// `PDFIUM_LIB_PATH` when set, the system library otherwise.
pub(crate) fn bind_pdfium() -> Result<Pdfium, IllustraError> {
    bind_pdfium_at(std::env::var("PDFIUM_LIB_PATH").ok().filter(|p| !p.is_empty()))
}

fn bind_pdfium_at(lib_dir: Option<String>) -> Result<Pdfium, IllustraError> {
    let bindings = match lib_dir {
        Some(dir) => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
        }
        None => Pdfium::bind_to_system_library(),
    };
    bindings
        .map(Pdfium::new)
        .map_err(|e| IllustraError::PdfiumBindingFailed(format!("{e:?}")))
}
