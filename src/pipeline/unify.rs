//! Segment unification: stitch multi-segment captures back into one image.
//!
//! A tall diagram sometimes arrives as several vertically adjacent crops
//! named `{prefix}_1.png`, `{prefix}_2.png`, …. This stage groups files by
//! stripping the last `_<integer>` suffix, stacks each group top-to-bottom
//! on a white canvas, saves the composite under the bare prefix, and removes
//! the segment files. Files without such a suffix are already unified and
//! are left untouched.

use std::path::{Path, PathBuf};

use image::{imageops, DynamicImage, Rgba, RgbaImage};
use tracing::{info, warn};

use crate::error::{IllustraError, ItemError};

/// Outcome of the unification stage.
#[derive(Debug, Default)]
pub struct UnifyReport {
    /// Prefixes that gained a composite file.
    pub unified: Vec<String>,
    /// Segment files deleted after merging.
    pub segments_removed: usize,
    /// Unreadable members, skipped but logged.
    pub failures: Vec<ItemError>,
}

/// Unify every segment group found in `dir`.
pub fn unify_segments(dir: &Path) -> Result<UnifyReport, IllustraError> {
    let mut groups: indexmap::IndexMap<String, Vec<(PathBuf, String)>> =
        indexmap::IndexMap::new();

    let entries = std::fs::read_dir(dir).map_err(|e| IllustraError::UnreadableArtifact {
        path: dir.to_path_buf(),
        detail: e.to_string(),
    })?;

    let mut names: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("png"))
        .collect();
    // Directory order is OS-dependent; a stable walk keeps composites
    // byte-identical across runs.
    names.sort();

    for path in names {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Some((prefix, suffix)) = split_segment_suffix(stem) {
            groups
                .entry(prefix.to_string())
                .or_default()
                .push((path.clone(), suffix.to_string()));
        }
    }

    let mut report = UnifyReport::default();

    for (prefix, mut members) in groups {
        if members.len() < 2 {
            continue;
        }

        sort_members(&prefix, &mut members);

        let mut images: Vec<DynamicImage> = Vec::with_capacity(members.len());
        for (path, _) in &members {
            match image::open(path) {
                Ok(img) => images.push(img),
                Err(e) => {
                    warn!("Segment {} unreadable, skipping: {e}", path.display());
                    report.failures.push(ItemError::UnreadableSegment {
                        path: path.display().to_string(),
                        detail: e.to_string(),
                    });
                }
            }
        }
        if images.is_empty() {
            warn!("Group {prefix}: no loadable segments, leaving files in place");
            continue;
        }

        let composite = stack_vertically(&images);
        let out_path = dir.join(format!("{prefix}.png"));
        composite
            .save(&out_path)
            .map_err(|e| IllustraError::OutputWriteFailed {
                path: out_path.clone(),
                source: std::io::Error::other(e.to_string()),
            })?;

        for (path, _) in &members {
            if std::fs::remove_file(path).is_ok() {
                report.segments_removed += 1;
            }
        }
        info!(
            "Unified {} segments → {}",
            members.len(),
            out_path.display()
        );
        report.unified.push(prefix);
    }

    Ok(report)
}

/// Split `IMAGE_ID_3_2` into `("IMAGE_ID_3", "2")`. Returns `None` when the
/// stem carries no trailing `_<integer>` segment index.
fn split_segment_suffix(stem: &str) -> Option<(&str, &str)> {
    let (prefix, suffix) = stem.rsplit_once('_')?;
    if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
        Some((prefix, suffix))
    } else {
        None
    }
}

/// Numeric ascending order on the segment index; if any member's suffix
/// fails to parse the whole group falls back to lexical filename order.
fn sort_members(prefix: &str, members: &mut [(PathBuf, String)]) {
    let all_numeric = members.iter().all(|(_, s)| s.parse::<u64>().is_ok());
    if all_numeric {
        members.sort_by_key(|(_, s)| s.parse::<u64>().unwrap_or(u64::MAX));
    } else {
        warn!("Group {prefix}: non-numeric segment index, sorting lexically");
        members.sort_by(|(a, _), (b, _)| a.cmp(b));
    }
}

/// Stack images top-to-bottom on a white canvas of `max(width) × Σheight`,
/// each segment horizontally centered.
fn stack_vertically(images: &[DynamicImage]) -> RgbaImage {
    let width = images.iter().map(|i| i.width()).max().unwrap_or(1);
    let height: u32 = images.iter().map(|i| i.height()).sum();

    let mut canvas = RgbaImage::from_pixel(width, height.max(1), Rgba([255, 255, 255, 255]));
    let mut y_offset: i64 = 0;
    for img in images {
        let x = i64::from((width - img.width()) / 2);
        imageops::overlay(&mut canvas, &img.to_rgba8(), x, y_offset);
        y_offset += i64::from(img.height());
    }
    canvas
}
