//! Filename-based content kind detection.

use crate::model::ContentKind;

/// Map a filename to its content kind using the lowercase suffix after the final `.`.
///
/// Content is never sniffed; a name without a recognized suffix yields
/// [`ContentKind::Unknown`].
pub fn detect(filename: &str) -> ContentKind {
    let Some((_, extension)) = filename.rsplit_once('.') else {
        return ContentKind::Unknown;
    };

    match extension.to_lowercase().as_str() {
        "csv" => ContentKind::TabularText,
        "xlsx" | "xls" => ContentKind::TabularSpreadsheet,
        "docx" => ContentKind::RichDocument,
        "pdf" => ContentKind::PortableDocument,
        "txt" => ContentKind::PlainText,
        "json" => ContentKind::StructuredText,
        _ => ContentKind::Unknown,
    }
}
