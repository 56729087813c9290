//! Description oracle adapter: one short description per unique image.
//!
//! For every image the lifecycle is strict: upload, describe, release. The
//! staged upload is deleted whether or not the generation call succeeded, so
//! a long batch never accumulates remote files. Any per-image oracle failure
//! records the [`DESCRIPTION_FAILURE_SENTINEL`] and moves on; only an empty
//! image directory is fatal, because a pipeline with nothing to describe has
//! already gone wrong upstream.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::artifacts::{DescriptionMap, DESCRIPTION_FAILURE_SENTINEL};
use crate::error::{IllustraError, ItemError};
use crate::oracle::GenerativeOracle;
use crate::prompts::vision_description_prompt;

/// Outcome of the vision stage.
#[derive(Debug)]
pub struct VisionReport {
    /// `image_id → description or sentinel`, in processing order.
    pub descriptions: DescriptionMap,
    /// Per-image oracle failures (each has a sentinel in `descriptions`).
    pub failures: Vec<ItemError>,
}

/// Describe every PNG in `images_dir`.
///
/// Files are processed sorted by filename so the description map (and
/// therefore placement order) is deterministic across runs.
pub async fn describe_images(
    images_dir: &Path,
    oracle: &dyn GenerativeOracle,
    title_context: &str,
) -> Result<VisionReport, IllustraError> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(images_dir)
        .map_err(|e| IllustraError::UnreadableArtifact {
            path: images_dir.to_path_buf(),
            detail: e.to_string(),
        })?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("png"))
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(IllustraError::NoImagesExtracted {
            dir: images_dir.to_path_buf(),
        });
    }

    let prompt = vision_description_prompt(title_context);
    let mut descriptions = DescriptionMap::new();
    let mut failures = Vec::new();

    info!("Describing {} images", files.len());

    for path in &files {
        let image_id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        match describe_one(oracle, &prompt, path).await {
            Ok(description) => {
                debug!("{image_id}: {description}");
                descriptions.insert(image_id, description);
            }
            Err(detail) => {
                warn!("{image_id}: description failed: {detail}");
                failures.push(ItemError::DescriptionFailed {
                    image_id: image_id.clone(),
                    detail,
                });
                descriptions.insert(image_id, DESCRIPTION_FAILURE_SENTINEL.to_string());
            }
        }
    }

    Ok(VisionReport {
        descriptions,
        failures,
    })
}

/// Upload → describe → always release.
async fn describe_one(
    oracle: &dyn GenerativeOracle,
    prompt: &str,
    path: &Path,
) -> Result<String, String> {
    let handle = oracle
        .upload_image(path)
        .await
        .map_err(|e| format!("upload: {e}"))?;

    let result = oracle.describe_upload(prompt, &handle).await;

    // Release before inspecting the result. A failed delete is logged but
    // does not turn a good description into a failure.
    if let Err(e) = oracle.delete_file(&handle).await {
        warn!("Failed to release {}: {e}", handle.name);
    }

    result
        .map(|text| text.trim().replace('\n', " "))
        .map_err(|e| format!("describe: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{OracleError, RemoteFile};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct ScriptedOracle {
        /// Upload paths observed, in call order.
        uploads: Mutex<Vec<String>>,
        deletes: AtomicUsize,
        /// Stems whose describe call should fail.
        fail_for: Vec<&'static str>,
    }

    impl ScriptedOracle {
        fn new(fail_for: Vec<&'static str>) -> Self {
            Self {
                uploads: Mutex::new(Vec::new()),
                deletes: AtomicUsize::new(0),
                fail_for,
            }
        }
    }

    #[async_trait]
    impl GenerativeOracle for ScriptedOracle {
        async fn upload_image(&self, path: &Path) -> Result<RemoteFile, OracleError> {
            let stem = path.file_stem().unwrap().to_str().unwrap().to_string();
            self.uploads.lock().unwrap().push(stem.clone());
            Ok(RemoteFile {
                name: format!("files/{stem}"),
                uri: format!("https://files.example/{stem}"),
                mime_type: "image/png".into(),
            })
        }

        async fn describe_upload(
            &self,
            _prompt: &str,
            file: &RemoteFile,
        ) -> Result<String, OracleError> {
            let stem = file.name.trim_start_matches("files/");
            if self.fail_for.contains(&stem) {
                Err(OracleError::Api {
                    status: 500,
                    message: "backend unavailable".into(),
                })
            } else {
                Ok(format!("  Contents of {stem}\n"))
            }
        }

        async fn generate_text(&self, _prompt: &str) -> Result<String, OracleError> {
            unreachable!("vision stage never calls the text model")
        }

        async fn delete_file(&self, _file: &RemoteFile) -> Result<(), OracleError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn touch_png(dir: &Path, name: &str) {
        // content is irrelevant; the scripted oracle never reads it
        std::fs::write(dir.join(name), b"png").unwrap();
    }

    #[tokio::test]
    async fn describes_in_filename_order_and_trims() {
        let dir = tempdir().unwrap();
        touch_png(dir.path(), "IMAGE_ID_0_1.png");
        touch_png(dir.path(), "IMAGE_ID_0_2.png");

        let oracle = ScriptedOracle::new(vec![]);
        let report = describe_images(dir.path(), &oracle, "Doc").await.unwrap();

        let keys: Vec<_> = report.descriptions.keys().cloned().collect();
        assert_eq!(keys, ["IMAGE_ID_0_1", "IMAGE_ID_0_2"]);
        assert_eq!(
            report.descriptions["IMAGE_ID_0_1"],
            "Contents of IMAGE_ID_0_1"
        );
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn failed_description_records_sentinel_and_continues() {
        let dir = tempdir().unwrap();
        touch_png(dir.path(), "a.png");
        touch_png(dir.path(), "b.png");

        let oracle = ScriptedOracle::new(vec!["a"]);
        let report = describe_images(dir.path(), &oracle, "Doc").await.unwrap();

        assert_eq!(report.descriptions["a"], DESCRIPTION_FAILURE_SENTINEL);
        assert_eq!(report.descriptions["b"], "Contents of b");
        assert_eq!(report.failures.len(), 1);
    }

    #[tokio::test]
    async fn every_upload_is_released_even_on_failure() {
        let dir = tempdir().unwrap();
        touch_png(dir.path(), "a.png");
        touch_png(dir.path(), "b.png");
        touch_png(dir.path(), "c.png");

        let oracle = ScriptedOracle::new(vec!["b"]);
        describe_images(dir.path(), &oracle, "Doc").await.unwrap();

        assert_eq!(oracle.uploads.lock().unwrap().len(), 3);
        assert_eq!(oracle.deletes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_directory_is_fatal() {
        let dir = tempdir().unwrap();
        let oracle = ScriptedOracle::new(vec![]);
        let err = describe_images(dir.path(), &oracle, "Doc").await.unwrap_err();
        assert!(matches!(err, IllustraError::NoImagesExtracted { .. }));
    }

    #[tokio::test]
    async fn non_png_files_are_ignored() {
        let dir = tempdir().unwrap();
        touch_png(dir.path(), "a.png");
        std::fs::write(dir.path().join("imagens_info.json"), b"{}").unwrap();

        let oracle = ScriptedOracle::new(vec![]);
        let report = describe_images(dir.path(), &oracle, "Doc").await.unwrap();
        assert_eq!(report.descriptions.len(), 1);
    }
}
