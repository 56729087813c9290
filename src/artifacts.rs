//! Typed records for every on-disk artifact the pipeline exchanges between
//! stages, plus validated load/save helpers.
//!
//! The file names and field names (`pagina`, `bbox`, `caminho`) are an
//! external interface: downstream renderers and monitoring jobs read these
//! JSON files directly, so they are fixed here as constants rather than
//! derived from struct names.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::IllustraError;

/// Coordinate map produced by layout analysis: `mapa_coordenadas.json`.
pub const COORDINATE_MAP_FILE: &str = "mapa_coordenadas.json";
/// Image index produced by extraction/dedup: `imagens_info.json`.
pub const IMAGE_INDEX_FILE: &str = "imagens_info.json";
/// Description map produced by the vision stage: `mapa_descricoes.json`.
pub const DESCRIPTION_MAP_FILE: &str = "mapa_descricoes.json";
/// Tagged summary produced by the placement stage.
pub const TAGGED_SUMMARY_FILE: &str = "resumo_com_tags_final.txt";
/// Intermediate HTML rendition of the source PDF.
pub const TEMP_HTML_FILE: &str = "temp_doc.html";

/// Sentinel recorded in the description map when the vision oracle failed
/// for an image. The placement stage skips entries carrying this value.
pub const DESCRIPTION_FAILURE_SENTINEL: &str = "ERRO_DESCRICAO";

/// Name of the cleanup manifest for a given output file stem.
pub fn cleanup_manifest_name(output_stem: &str) -> String {
    format!("cleanup_manifest_{output_stem}.json")
}

// ── Coordinate map ─────────────────────────────────────────────────────────

/// One captured-region entry: which page, and where on it.
///
/// `bbox` is `[x0, y0, x1, y1]` in PDF points with a top-left origin, so
/// `y0 < y1` reads top edge before bottom edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateMapEntry {
    /// 0-indexed source page.
    pub pagina: usize,
    /// Region bounds in points: `[x0, y0, x1, y1]`, top-left origin.
    pub bbox: [f32; 4],
}

/// `image_id → region`, in the order the regions were encountered.
///
/// Insertion order matters: placement later walks descriptions in this
/// order, so a plain `HashMap` would scramble the document flow and a
/// `BTreeMap` would sort `IMAGE_ID_0_10` before `IMAGE_ID_0_2`.
pub type CoordinateMap = IndexMap<String, CoordinateMapEntry>;

/// Load and validate a coordinate map.
///
/// A map whose bbox values are non-finite or inverted would silently produce
/// garbage crops three stages later, so it is rejected at the boundary.
pub fn load_coordinate_map(path: &Path) -> Result<CoordinateMap, IllustraError> {
    let map: CoordinateMap = load_json(path)?;
    for (id, entry) in &map {
        let [x0, y0, x1, y1] = entry.bbox;
        if !entry.bbox.iter().all(|v| v.is_finite()) {
            return Err(IllustraError::UnreadableArtifact {
                path: path.to_path_buf(),
                detail: format!("entry '{id}' has a non-finite bbox"),
            });
        }
        if x1 < x0 || y1 < y0 {
            return Err(IllustraError::UnreadableArtifact {
                path: path.to_path_buf(),
                detail: format!("entry '{id}' has an inverted bbox {:?}", entry.bbox),
            });
        }
    }
    Ok(map)
}

/// Save a coordinate map as pretty-printed JSON.
pub fn save_coordinate_map(path: &Path, map: &CoordinateMap) -> Result<(), IllustraError> {
    save_json(path, map)
}

// ── Image index ────────────────────────────────────────────────────────────

/// Source page of an extracted image: a 0-indexed number when the HTML
/// carried one, or the literal label `"Desconhecida"` when it did not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourcePage {
    Number(usize),
    Label(String),
}

impl Default for SourcePage {
    fn default() -> Self {
        SourcePage::Label("Desconhecida".to_string())
    }
}

/// One extracted, deduplicated image asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAssetRecord {
    /// Path of the saved file relative to the extraction directory.
    pub caminho: String,
    /// Source page, when known.
    #[serde(default)]
    pub pagina: SourcePage,
    /// Hex-encoded SHA-256 of the decoded image bytes.
    pub hash: String,
}

/// The extraction stage's full output: `imagens_info.json`, an object keyed
/// by filename in first-encountered order.
pub type ImageIndex = IndexMap<String, ImageAssetRecord>;

pub fn load_image_index(path: &Path) -> Result<ImageIndex, IllustraError> {
    load_json(path)
}

pub fn save_image_index(path: &Path, index: &ImageIndex) -> Result<(), IllustraError> {
    save_json(path, index)
}

// ── Description map ────────────────────────────────────────────────────────

/// `image_id → description` (or [`DESCRIPTION_FAILURE_SENTINEL`]), in the
/// order the images were described. Placement consumes it in this order.
pub type DescriptionMap = IndexMap<String, String>;

pub fn load_description_map(path: &Path) -> Result<DescriptionMap, IllustraError> {
    load_json(path)
}

pub fn save_description_map(path: &Path, map: &DescriptionMap) -> Result<(), IllustraError> {
    save_json(path, map)
}

// ── Cleanup manifest ───────────────────────────────────────────────────────

/// Inventory of intermediates a run produced: a flat, ordered list of paths
/// relative to the working directory. Written only on success so an external
/// janitor can garbage-collect without guessing; a failed run keeps its
/// intermediates for inspection.
pub type CleanupManifest = Vec<PathBuf>;

pub fn save_cleanup_manifest(path: &Path, manifest: &CleanupManifest) -> Result<(), IllustraError> {
    save_json(path, manifest)
}

pub fn load_cleanup_manifest(path: &Path) -> Result<CleanupManifest, IllustraError> {
    load_json(path)
}

// ── Shared JSON plumbing ───────────────────────────────────────────────────

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, IllustraError> {
    let bytes = fs::read(path).map_err(|e| IllustraError::UnreadableArtifact {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    serde_json::from_slice(&bytes).map_err(|e| IllustraError::UnreadableArtifact {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), IllustraError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| IllustraError::Internal(format!(
        "serialising {}: {e}",
        path.display()
    )))?;
    fs::write(path, json).map_err(|source| IllustraError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn coordinate_map_round_trips_with_field_names() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(COORDINATE_MAP_FILE);

        let mut map = CoordinateMap::new();
        map.insert(
            "IMAGE_ID_0_1".to_string(),
            CoordinateMapEntry {
                pagina: 0,
                bbox: [72.0, 100.0, 300.0, 250.0],
            },
        );
        save_coordinate_map(&path, &map).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"pagina\""));
        assert!(raw.contains("\"bbox\""));

        let loaded = load_coordinate_map(&path).unwrap();
        assert_eq!(loaded, map);
    }

    #[test]
    fn inverted_bbox_is_rejected_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(COORDINATE_MAP_FILE);
        std::fs::write(
            &path,
            r#"{"IMAGE_ID_0_1": {"pagina": 0, "bbox": [300.0, 100.0, 72.0, 250.0]}}"#,
        )
        .unwrap();

        let err = load_coordinate_map(&path).unwrap_err();
        assert!(matches!(err, IllustraError::UnreadableArtifact { .. }));
    }

    #[test]
    fn coordinate_map_preserves_insertion_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(COORDINATE_MAP_FILE);

        let mut map = CoordinateMap::new();
        for id in ["IMAGE_ID_0_2", "IMAGE_ID_0_10", "IMAGE_ID_1_1"] {
            map.insert(
                id.to_string(),
                CoordinateMapEntry {
                    pagina: 0,
                    bbox: [0.0, 0.0, 1.0, 1.0],
                },
            );
        }
        save_coordinate_map(&path, &map).unwrap();
        let loaded = load_coordinate_map(&path).unwrap();
        let keys: Vec<_> = loaded.keys().cloned().collect();
        assert_eq!(keys, ["IMAGE_ID_0_2", "IMAGE_ID_0_10", "IMAGE_ID_1_1"]);
    }

    #[test]
    fn source_page_serialises_number_or_label() {
        let n = serde_json::to_value(SourcePage::Number(3)).unwrap();
        assert_eq!(n, serde_json::json!(3));

        let l = serde_json::to_value(SourcePage::default()).unwrap();
        assert_eq!(l, serde_json::json!("Desconhecida"));

        let parsed: SourcePage = serde_json::from_value(serde_json::json!(7)).unwrap();
        assert_eq!(parsed, SourcePage::Number(7));
    }

    #[test]
    fn image_index_round_trips_keyed_by_filename() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(IMAGE_INDEX_FILE);

        let mut index = ImageIndex::new();
        index.insert(
            "img_1.png".to_string(),
            ImageAssetRecord {
                caminho: "imagens_extraidas/img_1.png".to_string(),
                pagina: SourcePage::Number(0),
                hash: "ab".repeat(32),
            },
        );
        save_image_index(&path, &index).unwrap();
        assert_eq!(load_image_index(&path).unwrap(), index);
    }

    #[test]
    fn cleanup_manifest_is_a_flat_array() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(cleanup_manifest_name("out"));

        let manifest: CleanupManifest =
            vec![PathBuf::from("temp_doc.html"), PathBuf::from("imagens_extraidas")];
        save_cleanup_manifest(&path, &manifest).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.trim_start().starts_with('['));
        assert_eq!(load_cleanup_manifest(&path).unwrap(), manifest);
    }

    #[test]
    fn missing_artifact_is_unreadable() {
        let err = load_description_map(Path::new("/nonexistent/mapa.json")).unwrap_err();
        assert!(matches!(err, IllustraError::UnreadableArtifact { .. }));
    }

    #[test]
    fn manifest_name_uses_output_stem() {
        assert_eq!(
            cleanup_manifest_name("relatorio_final"),
            "cleanup_manifest_relatorio_final.json"
        );
    }
}
