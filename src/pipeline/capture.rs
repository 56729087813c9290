//! Region capture: rasterise each mapped page once, then crop every region
//! in the coordinate map to its own PNG.
//!
//! Failures are strictly per-entry: a page index out of range or a
//! degenerate rectangle skips that region and records an [`ItemError`], it
//! never aborts the batch. One unreadable figure must not cost the other
//! thirty.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info, warn};

use crate::artifacts::CoordinateMap;
use crate::config::PipelineConfig;
use crate::error::{IllustraError, ItemError};

/// Outcome of the capture stage.
#[derive(Debug)]
pub struct CaptureReport {
    /// Ids whose region PNG was written, in coordinate-map order.
    pub captured: Vec<String>,
    /// Per-region failures. Never fatal.
    pub failures: Vec<ItemError>,
    /// Directory the PNGs were written to.
    pub output_dir: PathBuf,
}

/// Crop every region in `map` out of `pdf_path` into `out_dir/{image_id}.png`.
///
/// Runs inside `spawn_blocking` since pdfium operations are CPU-bound.
pub async fn capture_regions(
    pdf_path: &Path,
    map: &CoordinateMap,
    out_dir: &Path,
    config: &PipelineConfig,
) -> Result<CaptureReport, IllustraError> {
    let path = pdf_path.to_path_buf();
    let map = map.clone();
    let out = out_dir.to_path_buf();
    let config = config.clone();

    tokio::task::spawn_blocking(move || capture_regions_blocking(&path, &map, &out, &config))
        .await
        .map_err(|e| IllustraError::Internal(format!("Capture task panicked: {e}")))?
}

fn capture_regions_blocking(
    pdf_path: &Path,
    map: &CoordinateMap,
    out_dir: &Path,
    config: &PipelineConfig,
) -> Result<CaptureReport, IllustraError> {
    std::fs::create_dir_all(out_dir).map_err(|source| IllustraError::OutputWriteFailed {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let pdfium = super::bind_pdfium()?;
    let document =
        pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| IllustraError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: format!("{e:?}"),
            })?;
    let pages = document.pages();
    let total_pages = pages.len() as usize;

    // Each referenced page is rendered once and reused for all of its
    // regions. At 300 DPI a re-render per region would dominate the run.
    let mut page_cache: HashMap<usize, (DynamicImage, f32)> = HashMap::new();

    let mut captured = Vec::new();
    let mut failures = Vec::new();

    for (image_id, entry) in map {
        if entry.pagina >= total_pages {
            failures.push(ItemError::CaptureFailed {
                image_id: image_id.clone(),
                detail: format!("page index {} out of range ({total_pages} pages)", entry.pagina),
            });
            continue;
        }

        let (rendered, page_height) = match page_cache.entry(entry.pagina) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(slot) => {
                match render_page(&pages, entry.pagina, config.capture_dpi) {
                    Ok(v) => slot.insert(v),
                    Err(detail) => {
                        failures.push(ItemError::CaptureFailed {
                            image_id: image_id.clone(),
                            detail,
                        });
                        continue;
                    }
                }
            }
        };

        match crop_region(rendered, *page_height, entry.bbox, config) {
            Ok(crop) => {
                let out_path = out_dir.join(format!("{image_id}.png"));
                if let Err(e) = crop.save(&out_path) {
                    failures.push(ItemError::CaptureFailed {
                        image_id: image_id.clone(),
                        detail: format!("save {}: {e}", out_path.display()),
                    });
                } else {
                    debug!("Captured {} → {}", image_id, out_path.display());
                    captured.push(image_id.clone());
                }
            }
            Err(detail) => {
                warn!("Region {image_id} skipped: {detail}");
                failures.push(ItemError::CaptureFailed {
                    image_id: image_id.clone(),
                    detail,
                });
            }
        }
    }

    info!(
        "Capture complete: {} regions written, {} failed",
        captured.len(),
        failures.len()
    );

    Ok(CaptureReport {
        captured,
        failures,
        output_dir: out_dir.to_path_buf(),
    })
}

/// Render one page at the capture DPI. Returns the raster and the page
/// height in points (needed to scale bbox points to pixels).
fn render_page(
    pages: &PdfPages,
    page_index: usize,
    dpi: u32,
) -> Result<(DynamicImage, f32), String> {
    let page = pages
        .get(page_index as u16)
        .map_err(|e| format!("load page {page_index}: {e:?}"))?;

    let width_pt = page.width().value;
    let height_pt = page.height().value;
    let width_px = (width_pt * dpi as f32 / 72.0).round() as i32;
    let height_px = (height_pt * dpi as f32 / 72.0).round() as i32;

    let render_config = PdfRenderConfig::new()
        .set_target_width(width_px)
        .set_target_height(height_px);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| format!("render page {page_index}: {e:?}"))?;

    Ok((bitmap.as_image(), height_pt))
}

/// Crop one region (top-left-origin points) out of a rendered page,
/// expanding by the configured margin and clamping to the page raster.
fn crop_region(
    rendered: &DynamicImage,
    page_height_pt: f32,
    bbox: [f32; 4],
    config: &PipelineConfig,
) -> Result<DynamicImage, String> {
    let [x0, y0, x1, y1] = bbox;
    if x1 <= x0 || y1 <= y0 {
        return Err(format!("degenerate rectangle {bbox:?}"));
    }

    let scale = rendered.height() as f32 / page_height_pt;
    let margin = config.crop_margin_pt;

    let px0 = (((x0 - margin) * scale).floor()).max(0.0) as u32;
    let py0 = (((y0 - margin) * scale).floor()).max(0.0) as u32;
    let px1 = ((((x1 + margin) * scale).ceil()) as u32).min(rendered.width());
    let py1 = ((((y1 + margin) * scale).ceil()) as u32).min(rendered.height());

    if px1 <= px0 || py1 <= py0 {
        return Err(format!("region {bbox:?} falls outside the page raster"));
    }

    Ok(rendered.crop_imm(px0, py0, px1 - px0, py1 - py0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn solid_page(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba([200, 200, 200, 255]),
        ))
    }

    #[test]
    fn crop_scales_points_to_pixels_with_margin() {
        let config = PipelineConfig::default();
        // 792 pt page rendered at 300 DPI → 3300 px tall, scale ≈ 4.1667
        let page = solid_page(2550, 3300);
        let crop = crop_region(&page, 792.0, [72.0, 100.0, 300.0, 250.0], &config).unwrap();

        let scale: f64 = 3300.0 / 792.0;
        let expected_w = (((300.0 + 5.0) * scale).ceil() - ((72.0 - 5.0) * scale).floor()) as u32;
        let expected_h = (((250.0 + 5.0) * scale).ceil() - ((100.0 - 5.0) * scale).floor()) as u32;
        assert_eq!(crop.width(), expected_w);
        assert_eq!(crop.height(), expected_h);
    }

    #[test]
    fn crop_clamps_margin_at_page_edges() {
        let config = PipelineConfig::default();
        let page = solid_page(1000, 1000);
        // region flush against the top-left corner
        let crop = crop_region(&page, 1000.0, [0.0, 0.0, 100.0, 100.0], &config).unwrap();
        assert_eq!(crop.width(), 105);
        assert_eq!(crop.height(), 105);
    }

    #[test]
    fn degenerate_rectangle_is_rejected() {
        let config = PipelineConfig::default();
        let page = solid_page(100, 100);
        let err = crop_region(&page, 100.0, [50.0, 50.0, 50.0, 80.0], &config).unwrap_err();
        assert!(err.contains("degenerate"));
    }

    #[test]
    fn region_fully_outside_raster_is_rejected() {
        let config = PipelineConfig::default();
        let page = solid_page(100, 100);
        let err = crop_region(&page, 100.0, [200.0, 200.0, 300.0, 300.0], &config).unwrap_err();
        assert!(err.contains("outside"));
    }
}
