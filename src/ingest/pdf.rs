//! Portable document text extraction.

use super::types::ExtractionError;

/// Extract page text from a PDF, one block per page in page order.
///
/// Decoding is CPU-bound and runs on the blocking pool. The decoder walks pages one after
/// another on that single worker, so no two pages are ever in flight at once. A panic inside
/// the decoder is reported as a parse error instead of tearing down the caller.
pub(crate) async fn extract_pdf(bytes: Vec<u8>, filename: &str) -> Result<String, ExtractionError> {
    let pages = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem_by_pages(&bytes))
        .await
        .map_err(|err| ExtractionError::parse(filename, format!("PDF decoder aborted: {err}")))?
        .map_err(|err| {
            ExtractionError::parse(
                filename,
                format!("failed to read PDF, it may be corrupt or password protected: {err}"),
            )
        })?;

    tracing::debug!(file = filename, pages = pages.len(), "PDF decoded");
    Ok(render_pages(filename, &pages))
}

fn render_pages(filename: &str, pages: &[String]) -> String {
    let mut output = format!("Conteúdo do arquivo PDF: {filename}\n\n");
    for (index, page) in pages.iter().enumerate() {
        let text = page.split_whitespace().collect::<Vec<_>>().join(" ");
        output.push_str(&format!("--- Página {} ---\n{}\n\n", index + 1, text));
    }
    output
}
