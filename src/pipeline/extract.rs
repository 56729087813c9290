//! Body-image extraction and deduplication.
//!
//! Scans the intermediate HTML document's `<body>` for `<img>` elements in
//! document order, resolves each source (inline `data:` URI or remote URL),
//! and writes the surviving images as sequentially numbered PNG files.
//!
//! Two filters run in a fixed order, and the order matters:
//!
//! 1. **Duplicate.** The SHA-256 of the decoded bytes; the first recorded
//!    occurrence wins, later repeats are dropped. Recorded hashes are
//!    monotonic: once content is in, identical bytes are always rejected.
//! 2. **Size.** Images under the configured byte threshold are decorative
//!    fragments (bullets, rules). They are discarded *without* recording
//!    their hash — a tiny decoration must never shadow a later, full-size
//!    image that happens to share its bytes.

use std::collections::HashSet;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::artifacts::{save_image_index, ImageAssetRecord, ImageIndex, SourcePage, IMAGE_INDEX_FILE};
use crate::config::PipelineConfig;
use crate::error::IllustraError;

static IMG_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<img\b[^>]*>").expect("static regex"));
static SRC_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)\bsrc\s*=\s*["']([^"']+)["']"#).expect("static regex"));
static PAGE_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)\bdata-page-number\s*=\s*["'](\d+)["']"#).expect("static regex")
});
static BODY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<body\b[^>]*>(.*)</body>").expect("static regex"));

/// Outcome of the extraction stage.
#[derive(Debug)]
pub struct ExtractReport {
    /// One record per saved file, in document order.
    pub index: ImageIndex,
    /// Images dropped by the size filter.
    pub skipped_small: usize,
    /// Images dropped as exact-content duplicates.
    pub skipped_duplicates: usize,
    /// Sources that could not be resolved or decoded.
    pub skipped_unresolved: usize,
}

/// Extract, filter, and deduplicate every body image of `html_path` into
/// `out_dir`, writing `imagens_info.json` alongside the files.
pub async fn extract_body_images(
    html_path: &Path,
    out_dir: &Path,
    config: &PipelineConfig,
) -> Result<ExtractReport, IllustraError> {
    let html =
        std::fs::read_to_string(html_path).map_err(|e| IllustraError::UnreadableArtifact {
            path: html_path.to_path_buf(),
            detail: e.to_string(),
        })?;

    let body = BODY
        .captures(&html)
        .and_then(|c| c.get(1))
        .ok_or_else(|| IllustraError::MissingHtmlBody {
            path: html_path.to_path_buf(),
        })?
        .as_str();

    std::fs::create_dir_all(out_dir).map_err(|source| IllustraError::OutputWriteFailed {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.api_timeout_secs))
        .build()
        .map_err(|e| IllustraError::Internal(format!("HTTP client: {e}")))?;

    let mut seen_hashes: HashSet<String> = HashSet::new();
    let mut index = ImageIndex::new();
    let mut skipped_small = 0usize;
    let mut skipped_duplicates = 0usize;
    let mut skipped_unresolved = 0usize;

    for tag in IMG_TAG.find_iter(body) {
        let tag_str = tag.as_str();
        let Some(src) = SRC_ATTR.captures(tag_str).map(|c| c[1].to_string()) else {
            skipped_unresolved += 1;
            continue;
        };
        let pagina = PAGE_ATTR
            .captures(tag_str)
            .and_then(|c| c[1].parse::<usize>().ok())
            .map(SourcePage::Number)
            .unwrap_or_default();

        let bytes = match resolve_source(&client, &src).await {
            Ok(b) => b,
            Err(e) => {
                warn!("Skipping unresolvable image source: {e}");
                skipped_unresolved += 1;
                continue;
            }
        };

        let hash = hex_digest(&bytes);
        if seen_hashes.contains(&hash) {
            skipped_duplicates += 1;
            continue;
        }

        // Size filter second, and it never records the hash: a discarded
        // fragment must not shadow a later full-size occurrence.
        if (bytes.len() as u64) < config.min_image_bytes {
            debug!("Dropping {}-byte fragment (< {})", bytes.len(), config.min_image_bytes);
            skipped_small += 1;
            continue;
        }

        seen_hashes.insert(hash.clone());
        let file_name = format!("img_{}.png", index.len() + 1);
        let out_path = out_dir.join(&file_name);
        std::fs::write(&out_path, &bytes).map_err(|source| IllustraError::OutputWriteFailed {
            path: out_path.clone(),
            source,
        })?;

        index.insert(
            file_name.clone(),
            ImageAssetRecord {
                caminho: out_path.to_string_lossy().into_owned(),
                pagina,
                hash,
            },
        );
    }

    save_image_index(&out_dir.join(IMAGE_INDEX_FILE), &index)?;
    info!(
        "Extraction complete: {} kept, {} small, {} duplicates, {} unresolved",
        index.len(),
        skipped_small,
        skipped_duplicates,
        skipped_unresolved
    );

    Ok(ExtractReport {
        index,
        skipped_small,
        skipped_duplicates,
        skipped_unresolved,
    })
}

/// Resolve an image source to raw bytes: inline `data:` URI or remote URL.
async fn resolve_source(client: &reqwest::Client, src: &str) -> Result<Vec<u8>, String> {
    if let Some(rest) = src.strip_prefix("data:") {
        let (_, payload) = rest
            .split_once(";base64,")
            .ok_or_else(|| "data URI is not base64-encoded".to_string())?;
        return BASE64
            .decode(payload.trim())
            .map_err(|e| format!("base64 decode: {e}"));
    }

    if src.starts_with("http://") || src.starts_with("https://") {
        let response = client
            .get(src)
            .send()
            .await
            .map_err(|e| format!("GET {src}: {e}"))?;
        if !response.status().is_success() {
            return Err(format!("GET {src}: HTTP {}", response.status()));
        }
        return response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| format!("GET {src}: {e}"));
    }

    Err(format!("unsupported image source scheme: {src}"))
}

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn data_uri(bytes: &[u8]) -> String {
        format!("data:image/png;base64,{}", BASE64.encode(bytes))
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

    fn html_doc(imgs: &[String]) -> String {
        format!(
            "<html><body>\n{}\n</body></html>",
            imgs.iter()
                .map(|u| format!("<img src=\"{u}\" data-page-number=\"0\"/>"))
                .collect::<Vec<_>>()
                .join("\n")
        )
    }

    #[tokio::test]
    async fn keeps_large_unique_images_in_document_order() {
        let dir = tempdir().unwrap();
        let html_path = dir.path().join("doc.html");
        let out = dir.path().join("out");

        let a = noise(10_000, 1);
        let b = noise(10_000, 2);
        std::fs::write(&html_path, html_doc(&[data_uri(&a), data_uri(&b)])).unwrap();

        let config = PipelineConfig::default();
        let report = extract_body_images(&html_path, &out, &config).await.unwrap();

        assert_eq!(report.index.len(), 2);
        let names: Vec<_> = report.index.keys().cloned().collect();
        assert_eq!(names, ["img_1.png", "img_2.png"]);
        assert_eq!(std::fs::read(out.join("img_1.png")).unwrap(), a);
        assert_eq!(std::fs::read(out.join("img_2.png")).unwrap(), b);
        assert!(out.join(IMAGE_INDEX_FILE).exists());
    }

    #[tokio::test]
    async fn duplicates_are_dropped_after_the_first() {
        let dir = tempdir().unwrap();
        let html_path = dir.path().join("doc.html");
        let out = dir.path().join("out");

        let a = noise(10_000, 3);
        std::fs::write(&html_path, html_doc(&[data_uri(&a), data_uri(&a)])).unwrap();

        let config = PipelineConfig::default();
        let report = extract_body_images(&html_path, &out, &config).await.unwrap();

        assert_eq!(report.index.len(), 1);
        assert_eq!(report.skipped_duplicates, 1);
    }

    #[tokio::test]
    async fn small_fragments_never_record_their_hash() {
        let dir = tempdir().unwrap();
        let html_path = dir.path().join("doc.html");
        let out = dir.path().join("out");

        // Same payload twice: a truncated fragment first, the full image
        // later. If the fragment recorded a hash, padding schemes that reuse
        // bytes would drop real content.
        let small = noise(100, 4);
        let large = noise(10_000, 4);
        std::fs::write(
            &html_path,
            html_doc(&[data_uri(&small), data_uri(&large), data_uri(&small)]),
        )
        .unwrap();

        let config = PipelineConfig::default();
        let report = extract_body_images(&html_path, &out, &config).await.unwrap();

        assert_eq!(report.index.len(), 1);
        assert_eq!(report.skipped_small, 2);
        assert_eq!(report.skipped_duplicates, 0);
    }

    #[tokio::test]
    async fn page_attribution_defaults_to_unknown() {
        let dir = tempdir().unwrap();
        let html_path = dir.path().join("doc.html");
        let out = dir.path().join("out");

        let a = noise(10_000, 5);
        std::fs::write(
            &html_path,
            format!("<html><body><img src=\"{}\"/></body></html>", data_uri(&a)),
        )
        .unwrap();

        let config = PipelineConfig::default();
        let report = extract_body_images(&html_path, &out, &config).await.unwrap();

        assert_eq!(report.index["img_1.png"].pagina, SourcePage::default());
    }

    #[tokio::test]
    async fn missing_body_is_fatal() {
        let dir = tempdir().unwrap();
        let html_path = dir.path().join("doc.html");
        std::fs::write(&html_path, "<html><div>no body element</div></html>").unwrap();

        let config = PipelineConfig::default();
        let err = extract_body_images(&html_path, &dir.path().join("out"), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, IllustraError::MissingHtmlBody { .. }));
    }

    #[test]
    fn digest_is_hex_sha256() {
        // sha256("") is a well-known constant
        assert_eq!(
            hex_digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
