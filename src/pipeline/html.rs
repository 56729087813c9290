//! HTML conversion: serialise the PDF body to a simple intermediate HTML
//! document.
//!
//! Text objects become `<p>` elements; embedded raster images become
//! `data:` URIs carrying a `data-page-number` attribute so the extraction
//! stage can attribute each image back to its source page. The document is
//! deliberately flat — it exists for the extraction scan and for external
//! renderers, not for faithful visual reproduction.

use std::io::Cursor;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::ImageFormat;
use pdfium_render::prelude::*;
use tracing::{debug, info, warn};

use crate::error::IllustraError;

/// Convert `pdf_path` to an HTML document at `html_path`.
///
/// Runs inside `spawn_blocking` since pdfium operations are CPU-bound.
pub async fn convert_to_html(pdf_path: &Path, html_path: &Path) -> Result<(), IllustraError> {
    let pdf = pdf_path.to_path_buf();
    let html = html_path.to_path_buf();

    tokio::task::spawn_blocking(move || convert_to_html_blocking(&pdf, &html))
        .await
        .map_err(|e| IllustraError::Internal(format!("HTML task panicked: {e}")))?
}

fn convert_to_html_blocking(pdf_path: &Path, html_path: &Path) -> Result<(), IllustraError> {
    let pdfium = super::bind_pdfium()?;
    let document =
        pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| IllustraError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: format!("{e:?}"),
            })?;

    let pages = document.pages();
    let mut body = String::new();

    for (page_index, page) in pages.iter().enumerate() {
        for object in page.objects().iter() {
            match object.object_type() {
                PdfPageObjectType::Text => {
                    if let Some(text_object) = object.as_text_object() {
                        let text = text_object.text();
                        if !text.trim().is_empty() {
                            body.push_str("<p>");
                            body.push_str(&escape_html(text.trim()));
                            body.push_str("</p>\n");
                        }
                    }
                }
                PdfPageObjectType::Image => {
                    if let Some(image_object) = object.as_image_object() {
                        match encode_data_uri(image_object) {
                            Ok(uri) => {
                                body.push_str(&format!(
                                    "<img src=\"{uri}\" data-page-number=\"{page_index}\"/>\n"
                                ));
                            }
                            Err(e) => {
                                // A single undecodable XObject is not worth
                                // failing the whole document over.
                                warn!("Page {page_index}: skipping embedded image: {e}");
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        debug!("Serialised page {page_index}");
    }

    let html = format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"/></head>\n<body>\n{body}</body>\n</html>\n"
    );
    std::fs::write(html_path, html).map_err(|source| IllustraError::OutputWriteFailed {
        path: html_path.to_path_buf(),
        source,
    })?;

    info!("HTML rendition written to {}", html_path.display());
    Ok(())
}

fn encode_data_uri(image_object: &PdfPageImageObject) -> Result<String, String> {
    let raw = image_object
        .get_raw_image()
        .map_err(|e| format!("decode: {e:?}"))?;

    let mut png = Vec::new();
    raw.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| format!("encode: {e}"))?;

    Ok(format!("data:image/png;base64,{}", BASE64.encode(&png)))
}

/// Minimal text escaping for the three characters HTML cannot carry raw.
pub(crate) fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(
            escape_html("if a < b && b > c"),
            "if a &lt; b &amp;&amp; b &gt; c"
        );
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(escape_html("Waterfall model"), "Waterfall model");
    }
}
