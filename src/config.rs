//! Configuration types for the illustration pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across threads and to diff two runs to understand
//! why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A dozen-field constructor is unreadable and breaks on every new field. The
//! builder pattern lets callers set only what they care about and rely on
//! well-documented defaults for the rest.

use crate::error::IllustraError;
use crate::oracle::GenerativeOracle;
use crate::progress::StageProgressCallback;
use std::fmt;
use std::sync::Arc;

/// Configuration for a full illustration run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use illustra::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .capture_dpi(200)
///     .vision_model("gemini-2.5-flash")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Height of the header band excluded from layout analysis, in PDF points.
    /// Default: 50.0.
    ///
    /// Page furniture (running headers, logos) lives in the top band of almost
    /// every document. Images intersecting this band are never captured or
    /// described.
    pub header_margin_pt: f32,

    /// Height of the footer band excluded from layout analysis, in PDF points.
    /// Default: 50.0.
    ///
    /// Same reasoning as the header band: page numbers and footer rules are
    /// not content diagrams.
    pub footer_margin_pt: f32,

    /// Maximum vertical gap between an image's bottom edge and the top of a
    /// following text block for that text to count as the image's caption
    /// context, in PDF points. Default: 100.0.
    ///
    /// Captions sit directly under their figure. A window much wider than
    /// this starts picking up unrelated body paragraphs; much narrower misses
    /// captions separated by generous leading.
    pub text_window_pt: f32,

    /// Margin added on every side of a captured region before cropping, in
    /// PDF points. Default: 5.0.
    ///
    /// Reported object bounds frequently clip a stroke or a drop shadow by a
    /// pixel or two. A small symmetric margin keeps the crop visually whole
    /// without dragging in neighbouring content.
    pub crop_margin_pt: f32,

    /// Rendering DPI used when rasterising a page for region capture.
    /// Range: 150–600. Default: 300.
    ///
    /// 300 DPI keeps thin diagram strokes and small labels legible to the
    /// vision model. Below 150 the model starts misreading axis labels;
    /// above 600 the crops balloon past upload limits for no gain.
    pub capture_dpi: u32,

    /// Minimum size in bytes for an extracted image to be kept. Default: 7500.
    ///
    /// Bullets, horizontal rules, and tiny decorative glyphs all decode to a
    /// few kilobytes. Anything under this threshold is discarded before
    /// hashing so a decorative element never shadows a later real diagram
    /// with the same bytes.
    pub min_image_bytes: u64,

    /// Oracle API key. If None, falls back to the `GEMINI_API_KEY`
    /// environment variable at run start.
    pub api_key: Option<String>,

    /// Multimodal model used to describe captured images.
    /// Default: "gemini-2.5-flash".
    pub vision_model: String,

    /// Text model used for contextual tag placement.
    /// Default: "gemini-2.5-flash".
    pub text_model: String,

    /// Per-oracle-call timeout in seconds. Default: 60.
    ///
    /// Applies uniformly to uploads, generation calls, and deletes. A timeout
    /// is handled exactly like a remote API error: sentinel description or
    /// placement error marker, no retry.
    pub api_timeout_secs: u64,

    /// Pre-constructed oracle. Takes precedence over `api_key`.
    pub oracle: Option<Arc<dyn GenerativeOracle>>,

    /// Progress callback invoked at each stage boundary.
    pub progress: Option<Arc<dyn StageProgressCallback>>,

    /// Verify each placement response before accepting it. Default: true.
    ///
    /// When enabled, a placement response is accepted only if the new tag
    /// occurs at most once and every previously inserted tag survived.
    /// Non-conforming responses leave the summary buffer unchanged for that
    /// step. Disable to trust the oracle's output verbatim.
    pub enforce_single_insertion: bool,

    /// Working directory for intermediate artifacts. If None, a directory is
    /// created next to the output file.
    pub work_dir: Option<std::path::PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            header_margin_pt: 50.0,
            footer_margin_pt: 50.0,
            text_window_pt: 100.0,
            crop_margin_pt: 5.0,
            capture_dpi: 300,
            min_image_bytes: 7500,
            api_key: None,
            vision_model: "gemini-2.5-flash".to_string(),
            text_model: "gemini-2.5-flash".to_string(),
            api_timeout_secs: 60,
            oracle: None,
            progress: None,
            enforce_single_insertion: true,
            work_dir: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("header_margin_pt", &self.header_margin_pt)
            .field("footer_margin_pt", &self.footer_margin_pt)
            .field("text_window_pt", &self.text_window_pt)
            .field("crop_margin_pt", &self.crop_margin_pt)
            .field("capture_dpi", &self.capture_dpi)
            .field("min_image_bytes", &self.min_image_bytes)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("vision_model", &self.vision_model)
            .field("text_model", &self.text_model)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("oracle", &self.oracle.as_ref().map(|_| "<dyn GenerativeOracle>"))
            .field(
                "progress",
                &self.progress.as_ref().map(|_| "<dyn StageProgressCallback>"),
            )
            .field("enforce_single_insertion", &self.enforce_single_insertion)
            .field("work_dir", &self.work_dir)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn header_margin_pt(mut self, pt: f32) -> Self {
        self.config.header_margin_pt = pt.max(0.0);
        self
    }

    pub fn footer_margin_pt(mut self, pt: f32) -> Self {
        self.config.footer_margin_pt = pt.max(0.0);
        self
    }

    pub fn text_window_pt(mut self, pt: f32) -> Self {
        self.config.text_window_pt = pt.max(0.0);
        self
    }

    pub fn crop_margin_pt(mut self, pt: f32) -> Self {
        self.config.crop_margin_pt = pt.max(0.0);
        self
    }

    pub fn capture_dpi(mut self, dpi: u32) -> Self {
        self.config.capture_dpi = dpi.clamp(150, 600);
        self
    }

    pub fn min_image_bytes(mut self, bytes: u64) -> Self {
        self.config.min_image_bytes = bytes;
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn vision_model(mut self, model: impl Into<String>) -> Self {
        self.config.vision_model = model.into();
        self
    }

    pub fn text_model(mut self, model: impl Into<String>) -> Self {
        self.config.text_model = model.into();
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn oracle(mut self, oracle: Arc<dyn GenerativeOracle>) -> Self {
        self.config.oracle = Some(oracle);
        self
    }

    pub fn progress(mut self, callback: Arc<dyn StageProgressCallback>) -> Self {
        self.config.progress = Some(callback);
        self
    }

    pub fn enforce_single_insertion(mut self, v: bool) -> Self {
        self.config.enforce_single_insertion = v;
        self
    }

    pub fn work_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.config.work_dir = Some(dir.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, IllustraError> {
        let c = &self.config;
        if !(150..=600).contains(&c.capture_dpi) {
            return Err(IllustraError::InvalidConfig(format!(
                "capture DPI must be 150–600, got {}",
                c.capture_dpi
            )));
        }
        if c.vision_model.is_empty() || c.text_model.is_empty() {
            return Err(IllustraError::InvalidConfig(
                "model identifiers must be non-empty".into(),
            ));
        }
        if !c.header_margin_pt.is_finite()
            || !c.footer_margin_pt.is_finite()
            || !c.text_window_pt.is_finite()
            || !c.crop_margin_pt.is_finite()
        {
            return Err(IllustraError::InvalidConfig(
                "layout margins must be finite".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = PipelineConfig::default();
        assert_eq!(c.header_margin_pt, 50.0);
        assert_eq!(c.footer_margin_pt, 50.0);
        assert_eq!(c.text_window_pt, 100.0);
        assert_eq!(c.crop_margin_pt, 5.0);
        assert_eq!(c.capture_dpi, 300);
        assert_eq!(c.min_image_bytes, 7500);
        assert_eq!(c.api_timeout_secs, 60);
        assert!(c.enforce_single_insertion);
    }

    #[test]
    fn builder_clamps_dpi() {
        let c = PipelineConfig::builder().capture_dpi(50).build().unwrap();
        assert_eq!(c.capture_dpi, 150);
        let c = PipelineConfig::builder().capture_dpi(10_000).build().unwrap();
        assert_eq!(c.capture_dpi, 600);
    }

    #[test]
    fn builder_clamps_negative_margins() {
        let c = PipelineConfig::builder()
            .crop_margin_pt(-3.0)
            .header_margin_pt(-1.0)
            .build()
            .unwrap();
        assert_eq!(c.crop_margin_pt, 0.0);
        assert_eq!(c.header_margin_pt, 0.0);
    }

    #[test]
    fn empty_model_is_rejected() {
        let err = PipelineConfig::builder().vision_model("").build();
        assert!(matches!(err, Err(IllustraError::InvalidConfig(_))));
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = PipelineConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
