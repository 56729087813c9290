//! Final assembly: turn the tagged summary into the illustrated document.
//!
//! The tagged summary is Markdown. It is rendered to HTML, then every
//! `[image_id]` tag with a matching PNG in the images directory is replaced
//! by a centered `<img>` block, and the result is wrapped in a small
//! print-friendly stylesheet. Rasterising this HTML to a final PDF is the
//! job of an external renderer, not this crate.

use std::path::Path;

use pulldown_cmark::{html, Options, Parser};
use tracing::{debug, info};

use crate::error::IllustraError;

/// Stylesheet shared by every assembled document. Table rules matter: the
/// external renderer honours `page-break-inside`, and summaries routinely
/// carry wide comparison tables.
const DOCUMENT_STYLE: &str = r#"
        body { text-align: justify; font-family: Arial, sans-serif; margin: 50px; line-height: 1.6; }
        h1, h2, h3 { border-bottom: 1px solid #ddd; padding-bottom: 5px; margin-top: 30px; }
        ul { margin-bottom: 20px; }
        table { border-collapse: collapse; width: 100%; margin: 20px 0; font-size: 0.9em; page-break-inside: auto; }
        th, td { border: 1px solid #ccc; padding: 10px; text-align: left; page-break-inside: avoid; }
        th { background-color: #f2f2f2; font-weight: bold; }
        .image-container { text-align: center; margin: 20px auto; page-break-inside: avoid; }
        .image-container img { max-width: 70%; width: 100%; height: auto; }
"#;

/// Assemble the illustrated HTML document.
///
/// `images_dir` is scanned for PNG files; each `[stem]` tag found in the
/// rendered summary becomes an `<img>` whose `src` is
/// `{images_src_prefix}/{file}`, so the document stays portable as long as
/// the images directory travels with it.
pub fn assemble_document(
    tagged_summary: &str,
    images_dir: &Path,
    images_src_prefix: &str,
    title: &str,
) -> Result<String, IllustraError> {
    let mut body = render_markdown(tagged_summary);

    let mut files: Vec<String> = std::fs::read_dir(images_dir)
        .map_err(|e| IllustraError::UnreadableArtifact {
            path: images_dir.to_path_buf(),
            detail: e.to_string(),
        })?
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().map(String::from))
        .filter(|n| n.ends_with(".png"))
        .collect();
    files.sort();

    let mut substituted = 0usize;
    for file_name in &files {
        let image_id = file_name.trim_end_matches(".png");
        let tag = format!("[{image_id}]");
        if !body.contains(&tag) {
            debug!("No tag in summary for {file_name}");
            continue;
        }
        let replacement = format!(
            "<div class=\"image-container\"><img src=\"{images_src_prefix}/{file_name}\" alt=\"{image_id}\"/></div>"
        );
        body = body.replace(&tag, &replacement);
        substituted += 1;
    }
    info!("Assembly complete: {substituted} image tags substituted");

    Ok(format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<title>{title}</title>\n<style>{DOCUMENT_STYLE}</style>\n</head>\n<body>\n{body}\n</body></html>\n"
    ))
}

fn render_markdown(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 2);
    html::push_html(&mut out, parser);
    out
}
