//! Core data types and error definitions for the ingestion pipeline.

use thiserror::Error;

/// Errors produced while turning a selected file into text.
///
/// Both variants carry the filename so that a batch can report which member failed without
/// losing the results of the others.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The extension is not one of the supported formats.
    #[error("Unsupported file type: {filename}")]
    UnsupportedFormat {
        /// Name of the offending file.
        filename: String,
    },
    /// A format-specific decoder failed (corrupt, encrypted, or malformed input).
    #[error("Could not read file {filename}: {reason}")]
    Parse {
        /// Name of the offending file.
        filename: String,
        /// Decoder diagnostic.
        reason: String,
    },
}

impl ExtractionError {
    /// Name of the file the error refers to.
    pub fn filename(&self) -> &str {
        match self {
            Self::UnsupportedFormat { filename } | Self::Parse { filename, .. } => filename,
        }
    }

    pub(crate) fn parse(filename: &str, reason: impl std::fmt::Display) -> Self {
        Self::Parse {
            filename: filename.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Raw file picked by the operator, before extraction.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    /// Original filename; only its extension drives format detection.
    pub name: String,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

impl SelectedFile {
    /// Pair a filename with its contents.
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}
