//! CLI binary for illustra.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig` and reports run statistics.

use anyhow::{Context, Result};
use clap::Parser;
use illustra::{illustrate, PipelineConfig, ProgressEvent, StageProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a single 0–100 bar driven by the pipeline's
/// stage milestones, with the current stage status as the bar message.
struct CliStageProgress {
    bar: ProgressBar,
}

impl CliStageProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Illustrating");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }
}

impl StageProgressCallback for CliStageProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        if event.progress < 0 {
            self.bar.finish_and_clear();
            eprintln!("{} {}", red("✘"), event.status);
            return;
        }
        self.bar.set_position(event.progress as u64);
        self.bar.set_message(event.status.clone());
        if event.progress >= 100 {
            self.bar.finish_and_clear();
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic run: extract the PDF's diagrams and weave them into the summary
  illustra paper.pdf summary.md -o illustrated.html

  # Higher capture resolution for dense diagrams
  illustra --dpi 400 paper.pdf summary.md -o illustrated.html

  # Keep intermediates in a specific working directory
  illustra --work-dir ./run1 paper.pdf summary.md -o illustrated.html

  # Different models for vision and text calls
  illustra --vision-model gemini-2.5-pro --text-model gemini-2.5-flash \
      paper.pdf summary.md -o illustrated.html

  # Trust placement responses verbatim (skip the conformance check)
  illustra --no-enforce paper.pdf summary.md -o illustrated.html

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY        Google Gemini API key (required)
  PDFIUM_LIB_PATH       Path to an existing libpdfium shared library

OUTPUT:
  The illustrated HTML document is written to the path given by -o.
  Intermediate artifacts (extracted images, coordinate map, description
  map, tagged summary, cleanup manifest) land in the working directory,
  which defaults to the output file's directory.
"#;

/// Extract a PDF's diagrams and place them contextually into a summary.
#[derive(Parser, Debug)]
#[command(
    name = "illustra",
    version,
    about = "Extract PDF diagrams and place them contextually into a text summary",
    long_about = "Analyse a PDF's layout, capture its content images (ignoring header and \
footer furniture), describe each one with a vision model, and insert a reference tag for \
each image at the contextually correct position in a hand-written summary. The result is \
an illustrated HTML document.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Source PDF file.
    pdf: PathBuf,

    /// Plain-text or Markdown summary of the PDF.
    summary: PathBuf,

    /// Write the illustrated HTML document to this file.
    #[arg(short, long, env = "ILLUSTRA_OUTPUT")]
    output: PathBuf,

    /// Gemini API key. Falls back to the GEMINI_API_KEY environment variable.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Vision model used to describe captured images.
    #[arg(long, env = "ILLUSTRA_VISION_MODEL", default_value = "gemini-2.5-flash")]
    vision_model: String,

    /// Text model used for contextual tag placement.
    #[arg(long, env = "ILLUSTRA_TEXT_MODEL", default_value = "gemini-2.5-flash")]
    text_model: String,

    /// Region capture DPI (150–600).
    #[arg(long, env = "ILLUSTRA_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(150..=600))]
    dpi: u32,

    /// Working directory for intermediate artifacts.
    #[arg(long, env = "ILLUSTRA_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Per-API-call timeout in seconds.
    #[arg(long, env = "ILLUSTRA_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Minimum extracted-image size in bytes; smaller images are discarded.
    #[arg(long, env = "ILLUSTRA_MIN_IMAGE_BYTES", default_value_t = 7500)]
    min_image_bytes: u64,

    /// Accept placement responses verbatim, without the conformance check.
    #[arg(long, env = "ILLUSTRA_NO_ENFORCE")]
    no_enforce: bool,

    /// Disable progress bar.
    #[arg(long, env = "ILLUSTRA_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "ILLUSTRA_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "ILLUSTRA_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar carries the stage status lines already.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let mut builder = PipelineConfig::builder()
        .capture_dpi(cli.dpi)
        .vision_model(&cli.vision_model)
        .text_model(&cli.text_model)
        .api_timeout_secs(cli.api_timeout)
        .min_image_bytes(cli.min_image_bytes)
        .enforce_single_insertion(!cli.no_enforce);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref dir) = cli.work_dir {
        builder = builder.work_dir(dir);
    }
    if show_progress {
        builder = builder.progress(CliStageProgress::new());
    }

    let config = builder.build().context("Invalid configuration")?;

    // ── Run pipeline ─────────────────────────────────────────────────────
    let output = illustrate(&cli.pdf, &cli.summary, &cli.output, &config)
        .await
        .context("Illustration failed")?;

    if !cli.quiet {
        let stats = &output.stats;
        eprintln!(
            "{}  {} images described, {} tags placed, {}ms  →  {}",
            if stats.descriptions_failed == 0 && stats.placements_failed == 0 {
                green("✔")
            } else {
                bold("⚠")
            },
            stats.images_described,
            stats.tags_placed,
            stats.total_duration_ms,
            bold(&output.document_path.display().to_string()),
        );
        eprintln!(
            "   {}",
            dim(&format!(
                "{} regions mapped / {} captured / {} extracted / {} unified",
                stats.regions_mapped,
                stats.regions_captured,
                stats.images_extracted,
                stats.groups_unified
            )),
        );
        if stats.descriptions_failed > 0 || stats.placements_failed > 0 {
            eprintln!(
                "   {} descriptions failed, {} placements failed",
                red(&stats.descriptions_failed.to_string()),
                red(&stats.placements_failed.to_string()),
            );
        }
    }

    Ok(())
}
