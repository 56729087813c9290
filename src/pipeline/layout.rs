//! Layout analysis: partition each page into text and image blocks, mint a
//! stable id for every content image, and pair each image with the text that
//! follows it.
//!
//! All geometry here uses PDF points with a **top-left** origin (`y` grows
//! downward), matching the coordinate map consumed by downstream stages.
//! pdfium reports bounds from a bottom-left origin; [`analyze_layout`] flips
//! them before the pure geometry code ever sees a block.
//!
//! The geometry itself lives in [`analyze_page_blocks`], a pure function over
//! pre-extracted blocks, so the id-minting and association rules are unit
//! tested without a pdfium binary.

use std::path::Path;

use pdfium_render::prelude::*;
use tracing::{debug, info};

use crate::artifacts::{CoordinateMap, CoordinateMapEntry};
use crate::config::PipelineConfig;
use crate::error::IllustraError;

/// One block extracted from a page, in top-left-origin points.
#[derive(Debug, Clone, PartialEq)]
pub struct PageBlock {
    /// `[x0, y0, x1, y1]`, `y0` is the top edge.
    pub bbox: [f32; 4],
    pub kind: BlockKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Text(String),
    Image,
}

/// Output of the layout stage: where every content image lives, plus the
/// tagged text stream fed to human review and debugging.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutAnalysis {
    /// `image_id → page/bbox`, in document order.
    pub coordinate_map: CoordinateMap,
    /// One `[image_id]\n{nearest text}` block per image, joined by blank
    /// lines.
    pub tagged_content: String,
}

/// Analyse every page of `pdf_path`.
///
/// Runs inside `spawn_blocking` since pdfium operations are CPU-bound and
/// not async-safe.
pub async fn analyze_layout(
    pdf_path: &Path,
    config: &PipelineConfig,
) -> Result<LayoutAnalysis, IllustraError> {
    let path = pdf_path.to_path_buf();
    let config = config.clone();

    tokio::task::spawn_blocking(move || analyze_layout_blocking(&path, &config))
        .await
        .map_err(|e| IllustraError::Internal(format!("Layout task panicked: {e}")))?
}

fn analyze_layout_blocking(
    pdf_path: &Path,
    config: &PipelineConfig,
) -> Result<LayoutAnalysis, IllustraError> {
    let pdfium = super::bind_pdfium()?;

    let document =
        pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| IllustraError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: format!("{e:?}"),
            })?;

    let pages = document.pages();
    info!("Analysing layout: {} pages", pages.len());

    let mut coordinate_map = CoordinateMap::new();
    let mut tagged_segments: Vec<String> = Vec::new();

    for (page_index, page) in pages.iter().enumerate() {
        let page_height = page.height().value;
        let blocks = extract_page_blocks(&page, page_height);

        let (entries, segments) = analyze_page_blocks(page_index, page_height, &blocks, config);
        debug!(
            "Page {}: {} blocks, {} content images",
            page_index,
            blocks.len(),
            entries.len()
        );

        for (id, entry) in entries {
            coordinate_map.insert(id, entry);
        }
        tagged_segments.extend(segments);
    }

    Ok(LayoutAnalysis {
        coordinate_map,
        tagged_content: tagged_segments.join("\n\n"),
    })
}

/// Pull text and image blocks out of one page, flipping pdfium's
/// bottom-left-origin bounds into top-left-origin points.
fn extract_page_blocks(page: &PdfPage, page_height: f32) -> Vec<PageBlock> {
    let mut blocks = Vec::new();

    for object in page.objects().iter() {
        let Ok(bounds) = object.bounds() else {
            continue;
        };
        let bbox = [
            bounds.left().value,
            page_height - bounds.top().value,
            bounds.right().value,
            page_height - bounds.bottom().value,
        ];

        match object.object_type() {
            PdfPageObjectType::Text => {
                if let Some(text_object) = object.as_text_object() {
                    let text = text_object.text();
                    if !text.trim().is_empty() {
                        blocks.push(PageBlock {
                            bbox,
                            kind: BlockKind::Text(text),
                        });
                    }
                }
            }
            PdfPageObjectType::Image => {
                blocks.push(PageBlock {
                    bbox,
                    kind: BlockKind::Image,
                });
            }
            _ => {}
        }
    }

    blocks
}

/// Pure per-page analysis.
///
/// Returns the coordinate-map entries for this page (in encounter order) and
/// the tagged text segments for the content stream.
///
/// Rules:
/// * an image counts as content only when it sits entirely inside the body
///   band `[header_margin, page_height − footer_margin]`;
/// * ids are `IMAGE_ID_{page}_{n}` with `n` starting at 1 per page and
///   counting content images only, so header logos never shift later ids;
/// * the associated text is the nearest text block starting within
///   `text_window_pt` below the image's bottom edge, or empty when none
///   qualifies.
pub fn analyze_page_blocks(
    page_index: usize,
    page_height: f32,
    blocks: &[PageBlock],
    config: &PipelineConfig,
) -> (Vec<(String, CoordinateMapEntry)>, Vec<String>) {
    let body_y0 = config.header_margin_pt;
    let body_y1 = page_height - config.footer_margin_pt;

    let text_blocks: Vec<(&[f32; 4], &str)> = blocks
        .iter()
        .filter_map(|b| match &b.kind {
            BlockKind::Text(t) => Some((&b.bbox, t.as_str())),
            BlockKind::Image => None,
        })
        .collect();

    let mut entries = Vec::new();
    let mut segments = Vec::new();
    let mut counter = 0usize;

    for block in blocks {
        if block.kind != BlockKind::Image {
            continue;
        }
        let [_, y0, _, y1] = block.bbox;
        if y0 < body_y0 || y1 > body_y1 {
            continue;
        }

        counter += 1;
        let id = format!("IMAGE_ID_{page_index}_{counter}");
        let text = nearest_following_text(block.bbox, &text_blocks, config.text_window_pt);

        segments.push(format!("[{id}]\n{text}"));
        entries.push((
            id,
            CoordinateMapEntry {
                pagina: page_index,
                bbox: block.bbox,
            },
        ));
    }

    (entries, segments)
}

/// The text block whose top edge is closest below the image's bottom edge,
/// within `window_pt`. Ties resolve to the first block in encounter order.
fn nearest_following_text(
    image_bbox: [f32; 4],
    text_blocks: &[(&[f32; 4], &str)],
    window_pt: f32,
) -> String {
    let image_bottom = image_bbox[3];
    let mut best: Option<(f32, &str)> = None;

    for (bbox, text) in text_blocks {
        let gap = bbox[1] - image_bottom;
        if gap < 0.0 || gap >= window_pt {
            continue;
        }
        if best.map_or(true, |(d, _)| gap < d) {
            best = Some((gap, text));
        }
    }

    best.map(|(_, t)| t.trim().to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PipelineConfig {
        PipelineConfig::default()
    }

    fn text(bbox: [f32; 4], s: &str) -> PageBlock {
        PageBlock {
            bbox,
            kind: BlockKind::Text(s.to_string()),
        }
    }

    fn img(bbox: [f32; 4]) -> PageBlock {
        PageBlock {
            bbox,
            kind: BlockKind::Image,
        }
    }

    #[test]
    fn mints_ids_per_page_starting_at_one() {
        let blocks = vec![
            img([72.0, 100.0, 300.0, 250.0]),
            img([72.0, 300.0, 300.0, 450.0]),
        ];
        let (entries, _) = analyze_page_blocks(2, 792.0, &blocks, &config());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "IMAGE_ID_2_1");
        assert_eq!(entries[1].0, "IMAGE_ID_2_2");
    }

    #[test]
    fn header_and_footer_images_are_excluded_and_do_not_consume_ids() {
        let blocks = vec![
            // logo overlapping the header band
            img([72.0, 10.0, 150.0, 60.0]),
            // body image
            img([72.0, 100.0, 300.0, 250.0]),
            // footer decoration crossing into the footer band
            img([72.0, 700.0, 300.0, 780.0]),
        ];
        let (entries, _) = analyze_page_blocks(0, 792.0, &blocks, &config());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "IMAGE_ID_0_1");
        assert_eq!(entries[0].1.bbox, [72.0, 100.0, 300.0, 250.0]);
    }

    #[test]
    fn image_touching_body_band_edges_is_included() {
        // exactly [50, height-50]
        let blocks = vec![img([72.0, 50.0, 300.0, 742.0])];
        let (entries, _) = analyze_page_blocks(0, 792.0, &blocks, &config());
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn associates_nearest_following_text() {
        let blocks = vec![
            img([72.0, 100.0, 300.0, 250.0]),
            text([72.0, 260.0, 300.0, 280.0], "Close caption"),
            text([72.0, 320.0, 300.0, 340.0], "Farther paragraph"),
        ];
        let (_, segments) = analyze_page_blocks(0, 792.0, &blocks, &config());
        assert_eq!(segments, vec!["[IMAGE_ID_0_1]\nClose caption".to_string()]);
    }

    #[test]
    fn text_above_the_image_never_qualifies() {
        let blocks = vec![
            text([72.0, 60.0, 300.0, 90.0], "Heading above"),
            img([72.0, 100.0, 300.0, 250.0]),
        ];
        let (_, segments) = analyze_page_blocks(0, 792.0, &blocks, &config());
        assert_eq!(segments, vec!["[IMAGE_ID_0_1]\n".to_string()]);
    }

    #[test]
    fn text_outside_the_window_yields_empty_association() {
        // gap of exactly text_window_pt is excluded (half-open window)
        let blocks = vec![
            img([72.0, 100.0, 300.0, 250.0]),
            text([72.0, 350.0, 300.0, 370.0], "Too far"),
        ];
        let (_, segments) = analyze_page_blocks(0, 792.0, &blocks, &config());
        assert_eq!(segments, vec!["[IMAGE_ID_0_1]\n".to_string()]);
    }

    #[test]
    fn empty_page_produces_nothing() {
        let (entries, segments) = analyze_page_blocks(0, 792.0, &[], &config());
        assert!(entries.is_empty());
        assert!(segments.is_empty());
    }
}
