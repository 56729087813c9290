//! Top-level pipeline entry points.
//!
//! [`illustrate`] drives the five-stage state machine:
//!
//! ```text
//! HTML_CONVERT → IMAGE_CAPTURE → VISION_DESCRIBE → CONTEXTUAL_PLACE → FINAL_ASSEMBLE
//! ```
//!
//! Stages run strictly sequentially — each consumes the previous stage's
//! files. After each boundary a [`ProgressEvent`] goes to the configured
//! listener at a fixed milestone (0, 5, 10, 20, 40, 60, 80, 100); a stage
//! failure emits `{progress: -1}` and halts. No stage is retried and no
//! completed-stage artifact is rolled back, so a failed run leaves its
//! intermediates on disk for inspection. The cleanup manifest is written on
//! success only.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::artifacts::{
    cleanup_manifest_name, save_cleanup_manifest, save_coordinate_map, save_description_map,
    CleanupManifest, COORDINATE_MAP_FILE, DESCRIPTION_MAP_FILE, TAGGED_SUMMARY_FILE,
    TEMP_HTML_FILE,
};
use crate::config::PipelineConfig;
use crate::error::IllustraError;
use crate::oracle::{GeminiOracle, GenerativeOracle};
use crate::pipeline::{assemble, capture, extract, html, layout, place, unify, vision};
use crate::progress::ProgressEvent;

/// Directory (under the working directory) holding every image the run
/// captures or extracts.
pub const IMAGES_DIR_NAME: &str = "imagens_extraidas";

/// Fallback vision context when the summary yields no usable title line.
const DEFAULT_TITLE_CONTEXT: &str = "technical document";

/// Result of a successful pipeline run.
#[derive(Debug)]
pub struct PipelineOutput {
    /// The assembled illustrated HTML document.
    pub document_path: PathBuf,
    /// The tagged summary text, also persisted next to the other artifacts.
    pub tagged_summary: String,
    pub tagged_summary_path: PathBuf,
    /// Cleanup manifest for the external garbage collector.
    pub manifest_path: PathBuf,
    pub stats: PipelineStats,
}

/// Per-run counters, mostly for logging and CLI reporting.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PipelineStats {
    pub regions_mapped: usize,
    pub regions_captured: usize,
    pub images_extracted: usize,
    pub groups_unified: usize,
    pub images_described: usize,
    pub descriptions_failed: usize,
    pub tags_placed: usize,
    pub placements_failed: usize,
    pub total_duration_ms: u64,
}

/// Run the full pipeline: extract and describe the PDF's diagrams, weave
/// them into the summary, and assemble the illustrated document at
/// `output_path`.
///
/// # Errors
/// Returns `Err(IllustraError)` only for fatal conditions (missing inputs,
/// missing credential, zero extractable images, a stage-level failure).
/// Per-image problems degrade the output instead: sentinel descriptions,
/// placement error markers, skipped regions — all visible in `stats`.
pub async fn illustrate(
    pdf_path: impl AsRef<Path>,
    summary_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<PipelineOutput, IllustraError> {
    let total_start = Instant::now();
    let pdf_path = pdf_path.as_ref();
    let summary_path = summary_path.as_ref();
    let output_path = output_path.as_ref();
    info!("Starting illustration run: {}", pdf_path.display());

    emit(config, 0, "Starting pipeline run");

    // ── Validate inputs and credential up front ──────────────────────────
    let summary_text = match validate_inputs(pdf_path, summary_path) {
        Ok(text) => text,
        Err(e) => return fail(config, "Input validation failed", e),
    };
    let oracle = match resolve_oracle(config) {
        Ok(o) => o,
        Err(e) => return fail(config, "Critical: oracle credential missing", e),
    };
    let title_context = title_context_from_summary(&summary_text);

    // ── Working directory and manifest inventory ─────────────────────────
    let work_dir = match config.work_dir.clone() {
        Some(dir) => dir,
        None => output_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    std::fs::create_dir_all(&work_dir).map_err(|source| IllustraError::OutputWriteFailed {
        path: work_dir.clone(),
        source,
    })?;

    let html_path = work_dir.join(TEMP_HTML_FILE);
    let coord_path = work_dir.join(COORDINATE_MAP_FILE);
    let desc_path = work_dir.join(DESCRIPTION_MAP_FILE);
    let tagged_path = work_dir.join(TAGGED_SUMMARY_FILE);
    let images_dir = work_dir.join(IMAGES_DIR_NAME);

    // Inventory accumulated before anything runs, so the manifest reflects
    // intent rather than whichever files happened to materialise.
    let manifest: CleanupManifest = manifest_entries(
        &work_dir,
        &[&html_path, &coord_path, &desc_path, &tagged_path, &images_dir],
        &[pdf_path, summary_path],
    );
    let manifest_path = work_dir.join(cleanup_manifest_name(&output_stem(output_path)));

    let mut stats = PipelineStats::default();

    // ── Stage 1/5: HTML_CONVERT ──────────────────────────────────────────
    emit(config, 5, "Stage 1/5: converting PDF to HTML");
    if let Err(e) = html::convert_to_html(pdf_path, &html_path).await {
        return fail(config, "Stage 1/5 failed: HTML conversion", e);
    }
    emit(config, 10, "Stage 1/5 complete");

    // ── Stage 2/5: IMAGE_CAPTURE ─────────────────────────────────────────
    // Layout analysis, region capture, segment unification, and body
    // extraction all feed the same images directory, in that order.
    emit(config, 10, "Stage 2/5: capturing document images");
    let analysis = match layout::analyze_layout(pdf_path, config).await {
        Ok(a) => a,
        Err(e) => return fail(config, "Stage 2/5 failed: layout analysis", e),
    };
    stats.regions_mapped = analysis.coordinate_map.len();
    if let Err(e) = save_coordinate_map(&coord_path, &analysis.coordinate_map) {
        return fail(config, "Stage 2/5 failed: coordinate map", e);
    }

    let capture_report =
        match capture::capture_regions(pdf_path, &analysis.coordinate_map, &images_dir, config)
            .await
        {
            Ok(r) => r,
            Err(e) => return fail(config, "Stage 2/5 failed: region capture", e),
        };
    stats.regions_captured = capture_report.captured.len();

    let (unify_report, extract_report) =
        match finish_image_capture(&html_path, &images_dir, config).await {
            Ok(r) => r,
            Err(e) => return fail(config, "Stage 2/5 failed: image collection", e),
        };
    stats.groups_unified = unify_report.unified.len();
    stats.images_extracted = extract_report.index.len();
    emit(config, 20, "Stage 2/5 complete");

    // ── Stage 3/5: VISION_DESCRIBE ───────────────────────────────────────
    emit(config, 40, "Stage 3/5: describing images");
    let vision_report = match vision::describe_images(&images_dir, oracle.as_ref(), &title_context)
        .await
    {
        Ok(r) => r,
        Err(e) => return fail(config, "Stage 3/5 failed: image description", e),
    };
    stats.images_described = vision_report.descriptions.len();
    stats.descriptions_failed = vision_report.failures.len();
    if let Err(e) = save_description_map(&desc_path, &vision_report.descriptions) {
        return fail(config, "Stage 3/5 failed: description map", e);
    }
    emit(config, 60, "Stage 3/5 complete");

    // ── Stage 4/5: CONTEXTUAL_PLACE ──────────────────────────────────────
    emit(config, 60, "Stage 4/5: contextual tag placement");
    let placement = place::place_tags(
        &summary_text,
        &vision_report.descriptions,
        oracle.as_ref(),
        config.enforce_single_insertion,
    )
    .await;
    stats.tags_placed = placement.placed.len();
    stats.placements_failed = placement.failures.len();
    if let Err(e) = write_text(&tagged_path, &placement.summary) {
        return fail(config, "Stage 4/5 failed: tagged summary", e);
    }
    emit(config, 80, "Stage 4/5 complete");

    // ── Stage 5/5: FINAL_ASSEMBLE ────────────────────────────────────────
    emit(config, 80, "Stage 5/5: assembling final document");
    let images_prefix = src_prefix(&images_dir, output_path);
    let document =
        match assemble::assemble_document(&placement.summary, &images_dir, &images_prefix, &title_context)
        {
            Ok(d) => d,
            Err(e) => return fail(config, "Stage 5/5 failed: document assembly", e),
        };
    if let Err(e) = write_text(output_path, &document) {
        return fail(config, "Stage 5/5 failed: writing output", e);
    }
    emit(config, 100, "Pipeline complete");

    // A manifest that fails to write is logged, not fatal: the run itself
    // succeeded and the artifacts are all in place.
    if let Err(e) = save_cleanup_manifest(&manifest_path, &manifest) {
        warn!("Could not write cleanup manifest: {e}");
    }

    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    info!(
        "Illustration complete: {} described, {} placed, {}ms",
        stats.images_described, stats.tags_placed, stats.total_duration_ms
    );

    Ok(PipelineOutput {
        document_path: output_path.to_path_buf(),
        tagged_summary: placement.summary,
        tagged_summary_path: tagged_path,
        manifest_path,
        stats,
    })
}

/// Synchronous wrapper around [`illustrate`].
///
/// Creates a temporary tokio runtime internally.
pub fn illustrate_sync(
    pdf_path: impl AsRef<Path>,
    summary_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<PipelineOutput, IllustraError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| IllustraError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(illustrate(pdf_path, summary_path, output_path, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Tail of the capture stage: stitch the captured segment groups, then pull
/// the HTML body images into the same directory.
///
/// Unification must run before extraction: the extractor's sequentially
/// numbered `img_N.png` outputs parse as one big segment group, and the
/// stitcher would merge the deduplicated images away if it saw them.
async fn finish_image_capture(
    html_path: &Path,
    images_dir: &Path,
    config: &PipelineConfig,
) -> Result<(unify::UnifyReport, extract::ExtractReport), IllustraError> {
    let unify_report = unify::unify_segments(images_dir)?;
    let extract_report = extract::extract_body_images(html_path, images_dir, config).await?;
    Ok((unify_report, extract_report))
}

fn emit(config: &PipelineConfig, progress: i32, status: &str) {
    if let Some(ref cb) = config.progress {
        cb.on_progress(&ProgressEvent::new(progress, status));
    }
}

/// Emit the terminal failure event and propagate the error.
fn fail(
    config: &PipelineConfig,
    status: &str,
    err: IllustraError,
) -> Result<PipelineOutput, IllustraError> {
    if let Some(ref cb) = config.progress {
        cb.on_progress(&ProgressEvent::failed(format!("{status}: {err}")));
    }
    Err(err)
}

/// Check both inputs exist and the PDF really is one; return the summary
/// text.
fn validate_inputs(pdf_path: &Path, summary_path: &Path) -> Result<String, IllustraError> {
    if !pdf_path.is_file() {
        return Err(IllustraError::PdfNotFound {
            path: pdf_path.to_path_buf(),
        });
    }
    let header = std::fs::read(pdf_path).map_err(|_| IllustraError::PdfNotFound {
        path: pdf_path.to_path_buf(),
    })?;
    let mut magic = [0u8; 4];
    magic.copy_from_slice(header.get(..4).unwrap_or(b"\0\0\0\0"));
    if &magic != b"%PDF" {
        return Err(IllustraError::NotAPdf {
            path: pdf_path.to_path_buf(),
            magic,
        });
    }

    std::fs::read_to_string(summary_path).map_err(|_| IllustraError::SummaryNotFound {
        path: summary_path.to_path_buf(),
    })
}

/// Resolve the oracle, from most-specific to least-specific:
///
/// 1. **Pre-built oracle** (`config.oracle`) — used as-is; the route for
///    tests and callers with custom middleware.
/// 2. **Configured key** (`config.api_key`).
/// 3. **Environment** (`GEMINI_API_KEY`).
fn resolve_oracle(config: &PipelineConfig) -> Result<Arc<dyn GenerativeOracle>, IllustraError> {
    if let Some(ref oracle) = config.oracle {
        return Ok(Arc::clone(oracle));
    }

    let key = config
        .api_key
        .clone()
        .or_else(|| std::env::var("GEMINI_API_KEY").ok())
        .filter(|k| !k.is_empty())
        .ok_or(IllustraError::MissingCredential)?;

    Ok(Arc::new(GeminiOracle::new(
        key,
        &config.vision_model,
        &config.text_model,
        config.api_timeout_secs,
    )?))
}

/// First non-empty line of the summary, stripped of Markdown heading and
/// emphasis markers. Falls back to a generic context.
fn title_context_from_summary(summary: &str) -> String {
    summary
        .lines()
        .map(|l| l.trim_start_matches(['#', '*', ' ']).trim())
        .find(|l| !l.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_TITLE_CONTEXT.to_string())
}

fn output_stem(output_path: &Path) -> String {
    output_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string()
}

/// Manifest entries are relative to the working directory; inputs that live
/// elsewhere are the caller's to keep.
fn manifest_entries(work_dir: &Path, artifacts: &[&Path], inputs: &[&Path]) -> CleanupManifest {
    inputs
        .iter()
        .chain(artifacts.iter())
        .filter_map(|p| p.strip_prefix(work_dir).ok().map(Path::to_path_buf))
        .collect()
}

/// `src` prefix that makes image references resolve relative to the final
/// document's own directory.
fn src_prefix(images_dir: &Path, output_path: &Path) -> String {
    let base = output_path.parent().unwrap_or_else(|| Path::new("."));
    images_dir
        .strip_prefix(base)
        .unwrap_or(images_dir)
        .to_string_lossy()
        .into_owned()
}

fn write_text(path: &Path, text: &str) -> Result<(), IllustraError> {
    std::fs::write(path, text).map_err(|source| IllustraError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_context_strips_leading_markdown_markers() {
        assert_eq!(
            title_context_from_summary("# Waterfall Models\nrest"),
            "Waterfall Models"
        );
        assert_eq!(
            title_context_from_summary("### Software Engineering\n\nBody."),
            "Software Engineering"
        );
    }

    #[test]
    fn title_context_skips_blank_leading_lines() {
        assert_eq!(title_context_from_summary("\n\n  \nActual Title"), "Actual Title");
    }

    #[test]
    fn title_context_falls_back_when_empty() {
        assert_eq!(title_context_from_summary("   \n\n"), DEFAULT_TITLE_CONTEXT);
    }

    #[test]
    fn manifest_only_lists_paths_inside_the_work_dir() {
        let work = Path::new("/tmp/run");
        let html = work.join(TEMP_HTML_FILE);
        let images = work.join(IMAGES_DIR_NAME);
        let outside = Path::new("/home/user/input.pdf");

        let manifest = manifest_entries(work, &[&html, &images], &[outside]);
        assert_eq!(
            manifest,
            vec![PathBuf::from(TEMP_HTML_FILE), PathBuf::from(IMAGES_DIR_NAME)]
        );
    }

    #[test]
    fn src_prefix_is_relative_to_the_document() {
        let prefix = src_prefix(
            Path::new("/tmp/run/imagens_extraidas"),
            Path::new("/tmp/run/final.html"),
        );
        assert_eq!(prefix, "imagens_extraidas");
    }

    #[test]
    fn output_stem_drops_extension() {
        assert_eq!(output_stem(Path::new("/a/b/relatorio_final.html")), "relatorio_final");
    }

    /// Incompressible payload of exactly `len` bytes.
    fn noise(len: usize, seed: u64) -> Vec<u8> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                (state >> 33) as u8
            })
            .collect()
    }

    #[tokio::test]
    async fn extracted_images_survive_segment_stitching() {
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine;
        use image::{Rgba, RgbaImage};

        let dir = tempfile::tempdir().unwrap();
        let images_dir = dir.path().join(IMAGES_DIR_NAME);
        std::fs::create_dir_all(&images_dir).unwrap();

        // one captured diagram that arrived as two vertical segments
        for (name, shade) in [("IMAGE_ID_0_1_1.png", 10u8), ("IMAGE_ID_0_1_2.png", 20)] {
            RgbaImage::from_pixel(80, 40, Rgba([shade, shade, shade, 255]))
                .save(images_dir.join(name))
                .unwrap();
        }

        // two distinct full-size body images embedded in the HTML
        let html_path = dir.path().join(TEMP_HTML_FILE);
        let imgs: String = [noise(10_000, 1), noise(10_000, 2)]
            .iter()
            .map(|b| format!("<img src=\"data:image/png;base64,{}\"/>\n", BASE64.encode(b)))
            .collect();
        std::fs::write(&html_path, format!("<html><body>\n{imgs}</body></html>")).unwrap();

        let config = PipelineConfig::default();
        let (unify_report, extract_report) =
            finish_image_capture(&html_path, &images_dir, &config)
                .await
                .unwrap();

        assert_eq!(unify_report.unified, vec!["IMAGE_ID_0_1".to_string()]);
        assert_eq!(extract_report.index.len(), 2);

        // each deduplicated body image survives alongside the composite;
        // nothing collapsed them into an img.png group
        assert!(images_dir.join("IMAGE_ID_0_1.png").exists());
        assert!(images_dir.join("img_1.png").exists());
        assert!(images_dir.join("img_2.png").exists());
        assert!(!images_dir.join("img.png").exists());
    }
}
