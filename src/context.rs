//! Grounding context assembled from the catalog ahead of every model query.

use crate::config::{DEFAULT_CONTEXT_MAX_CHARS, get_config};
use crate::model::UploadedFile;

const NOT_INFORMED_F: &str = "Não informada";
const NOT_INFORMED_M: &str = "Não informado";

/// Builds the per-file blocks injected into the system instruction.
#[derive(Debug, Clone, Copy)]
pub struct ContextAssembler {
    max_chars: usize,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_MAX_CHARS)
    }
}

impl ContextAssembler {
    /// Assembler that keeps at most `max_chars` characters of each file's content.
    pub const fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    /// Assembler using the configured budget.
    pub fn from_config() -> Self {
        Self::new(get_config().context_max_chars)
    }

    /// Render the catalog, in order, as delimited blocks separated by a blank line.
    ///
    /// Content beyond the budget is dropped silently. An empty catalog yields an empty string.
    pub fn build_context(&self, catalog: &[UploadedFile]) -> String {
        catalog
            .iter()
            .map(|file| self.file_block(file))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn file_block(&self, file: &UploadedFile) -> String {
        let metadata = &file.metadata;
        format!(
            "--- INÍCIO DO ARQUIVO: {name} ---\n\
             METADADOS:\n\
             - Categoria/Setor: {category}\n\
             - Descrição do Arquivo: {description}\n\
             - Fonte dos Dados: {source}\n\
             - Período dos Dados: {period}\n\
             - Tipo/Nome dos Casos: {case_name}\n\
             - Tipo de Arquivo: {kind}\n\
             \n\
             CONTEÚDO:\n\
             {content}\n\
             --- FIM DO ARQUIVO: {name} ---",
            name = file.name,
            category = metadata.category.label(),
            description = or_placeholder(&metadata.description, NOT_INFORMED_F),
            source = or_placeholder(&metadata.source, NOT_INFORMED_F),
            period = or_placeholder(&metadata.period, NOT_INFORMED_M),
            case_name = or_placeholder(&metadata.case_name, NOT_INFORMED_M),
            kind = file.kind,
            content = truncate_chars(&file.content, self.max_chars),
        )
    }
}

fn or_placeholder<'a>(value: &'a Option<String>, placeholder: &'a str) -> &'a str {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(placeholder)
}

/// Keep the first `max_chars` characters of `text`, never splitting a code point.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
