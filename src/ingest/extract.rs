//! Content extraction: one strategy per content kind.

use super::format::detect;
use super::office::{extract_docx, extract_workbook};
use super::pdf::extract_pdf;
use super::types::ExtractionError;
use crate::model::ContentKind;

/// Turn raw file bytes into a single UTF-8 text blob suitable for model consumption.
///
/// The filename is used only to pick the strategy (by extension) and to label headers and
/// errors. Decoder failures are returned as [`ExtractionError::Parse`] naming the file.
pub async fn extract(bytes: Vec<u8>, filename: &str) -> Result<String, ExtractionError> {
    match detect(filename) {
        ContentKind::PlainText | ContentKind::StructuredText | ContentKind::TabularText => {
            Ok(decode_text(&bytes))
        }
        ContentKind::TabularSpreadsheet if is_legacy_workbook(filename) => Err(ExtractionError::parse(
            filename,
            "legacy binary workbooks (.xls) cannot be read; save the file as .xlsx",
        )),
        ContentKind::TabularSpreadsheet => {
            run_blocking(filename, move |name| extract_workbook(&bytes, name)).await
        }
        ContentKind::RichDocument => {
            run_blocking(filename, move |name| extract_docx(&bytes, name)).await
        }
        ContentKind::PortableDocument => extract_pdf(bytes, filename).await,
        ContentKind::Unknown => Err(ExtractionError::UnsupportedFormat {
            filename: filename.to_string(),
        }),
    }
}

fn decode_text(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.strip_prefix('\u{feff}').unwrap_or(&text).to_string()
}

fn is_legacy_workbook(filename: &str) -> bool {
    filename.to_lowercase().ends_with(".xls")
}

async fn run_blocking<F>(filename: &str, job: F) -> Result<String, ExtractionError>
where
    F: FnOnce(&str) -> Result<String, ExtractionError> + Send + 'static,
{
    let owned = filename.to_string();
    tokio::task::spawn_blocking(move || job(&owned))
        .await
        .map_err(|err| ExtractionError::parse(filename, format!("decoder aborted: {err}")))?
}
