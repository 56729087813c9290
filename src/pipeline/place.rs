//! Contextual placement: weave image tags into the summary, one at a time.
//!
//! The engine is an explicit fold: a single text buffer threads through the
//! description map in iteration order, and each step is a pure function from
//! `(buffer, id, description)` to the next buffer. Steps are strictly
//! sequential — every placement decision depends on where the previous tags
//! already landed — so there is no fan-out here by design.

use tracing::{debug, info, warn};

use crate::artifacts::{DescriptionMap, DESCRIPTION_FAILURE_SENTINEL};
use crate::error::ItemError;
use crate::oracle::GenerativeOracle;
use crate::prompts::placement_prompt;

/// Outcome of the placement stage.
#[derive(Debug)]
pub struct PlacementReport {
    /// The final tagged summary.
    pub summary: String,
    /// Tags the oracle actually inserted.
    pub placed: Vec<String>,
    /// Ids skipped because their description was the failure sentinel.
    pub skipped_sentinels: Vec<String>,
    /// Responses rejected by the conformance check (buffer kept unchanged).
    pub rejected: Vec<String>,
    /// Per-tag oracle failures (each left an error marker in the summary).
    pub failures: Vec<ItemError>,
}

/// Fold every `(image_id, description)` pair into `summary`.
///
/// With `enforce_single_insertion` set, a response is accepted only when the
/// new tag occurs at most once and every previously inserted tag survived;
/// otherwise the buffer is left unchanged for that step. Oracle errors never
/// abort the fold — they append a visible `[ERRO POSICIONAMENTO: …]` marker
/// so the failure stays traceable in the final artifact.
pub async fn place_tags(
    summary: &str,
    descriptions: &DescriptionMap,
    oracle: &dyn GenerativeOracle,
    enforce_single_insertion: bool,
) -> PlacementReport {
    let mut buffer = summary.to_string();
    let mut placed: Vec<String> = Vec::new();
    let mut skipped_sentinels = Vec::new();
    let mut rejected = Vec::new();
    let mut failures = Vec::new();

    for (image_id, description) in descriptions {
        if description == DESCRIPTION_FAILURE_SENTINEL {
            debug!("Skipping {image_id}: no usable description");
            skipped_sentinels.push(image_id.clone());
            continue;
        }

        let tag = format!("[{image_id}]");
        let prompt = placement_prompt(&tag, description, &buffer);

        match oracle.generate_text(&prompt).await {
            Ok(response) => {
                let candidate = response.trim().to_string();
                if enforce_single_insertion && !conforms(&candidate, &tag, &placed) {
                    warn!("Response for {image_id} rejected by conformance check");
                    rejected.push(image_id.clone());
                    continue;
                }
                if candidate.contains(&tag) {
                    placed.push(tag);
                }
                buffer = candidate;
            }
            Err(e) => {
                warn!("Placement of {image_id} failed: {e}");
                buffer.push_str(&format!("\n\n[ERRO POSICIONAMENTO: [{image_id}]]"));
                failures.push(ItemError::PlacementFailed {
                    image_id: image_id.clone(),
                    detail: e.to_string(),
                });
            }
        }
    }

    info!(
        "Placement complete: {} placed, {} sentinel-skipped, {} rejected, {} failed",
        placed.len(),
        skipped_sentinels.len(),
        rejected.len(),
        failures.len()
    );

    PlacementReport {
        summary: buffer,
        placed,
        skipped_sentinels,
        rejected,
        failures,
    }
}

/// A candidate buffer conforms when the new tag appears at most once and no
/// previously inserted tag was dropped.
fn conforms(candidate: &str, new_tag: &str, placed: &[String]) -> bool {
    candidate.matches(new_tag).count() <= 1 && placed.iter().all(|t| candidate.contains(t.as_str()))
}
