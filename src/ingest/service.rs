//! Ingestion service turning operator selections into [`UploadedFile`] records.

use super::extract::extract;
use super::format::detect;
use super::types::{ExtractionError, SelectedFile};
use crate::model::{FileMetadata, UploadedFile};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extract a single selection and wrap it in a record with a fresh id and timestamp.
pub async fn ingest_file(
    selected: SelectedFile,
    metadata: FileMetadata,
) -> Result<UploadedFile, ExtractionError> {
    let SelectedFile { name, bytes } = selected;
    let kind = detect(&name);
    let size = bytes.len();
    let content = extract(bytes, &name).await?;
    tracing::info!(
        file = %name,
        kind = %kind,
        bytes = size,
        chars = content.chars().count(),
        "File extracted"
    );
    Ok(UploadedFile::new(name, kind, content, metadata))
}

/// Extract a batch of selections one after another.
///
/// Results line up with the input order. A failing member yields its own error and never
/// prevents the remaining files from being processed.
pub async fn ingest_batch(
    files: Vec<SelectedFile>,
    metadata: &FileMetadata,
) -> Vec<Result<UploadedFile, ExtractionError>> {
    let mut results = Vec::with_capacity(files.len());
    for file in files {
        let result = ingest_file(file, metadata.clone()).await;
        if let Err(error) = &result {
            tracing::warn!(file = error.filename(), error = %error, "Skipping unreadable file");
        }
        results.push(result);
    }
    results
}

/// Read the given paths into selections, expanding directories recursively.
///
/// Directory contents are visited in sorted order so that batches are reproducible.
pub fn read_selection(paths: &[PathBuf]) -> std::io::Result<Vec<SelectedFile>> {
    let mut selected = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry.map_err(std::io::Error::other)?;
                if entry.file_type().is_file() {
                    selected.push(read_one(entry.path())?);
                }
            }
        } else {
            selected.push(read_one(path)?);
        }
    }
    Ok(selected)
}

fn read_one(path: &Path) -> std::io::Result<SelectedFile> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(SelectedFile::new(name, std::fs::read(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::office::tests::sample_docx;
    use crate::model::{Category, ContentKind};

    #[tokio::test]
    async fn one_corrupt_file_does_not_affect_the_rest() {
        let batch = vec![
            SelectedFile::new("casos.csv", "municipio,casos\nNiterói,3"),
            SelectedFile::new("boletim.pdf", b"this is not a pdf".to_vec()),
            SelectedFile::new("notas.txt", "Notas da reunião"),
            SelectedFile::new("relatorio.docx", sample_docx()),
        ];
        let metadata = FileMetadata {
            category: Category::Health,
            ..FileMetadata::default()
        };

        let results = ingest_batch(batch, &metadata).await;
        assert_eq!(results.len(), 4);

        let csv = results[0].as_ref().expect("csv ingested");
        assert_eq!(csv.name, "casos.csv");
        assert_eq!(csv.kind, ContentKind::TabularText);
        assert_eq!(csv.metadata.category, Category::Health);

        let error = results[1].as_ref().expect_err("corrupt pdf");
        assert_eq!(error.filename(), "boletim.pdf");
        assert!(matches!(error, ExtractionError::Parse { .. }));

        assert_eq!(results[2].as_ref().expect("txt").content, "Notas da reunião");
        assert_eq!(results[3].as_ref().expect("docx").kind, ContentKind::RichDocument);
    }

    #[tokio::test]
    async fn records_get_distinct_identifiers() {
        let first = ingest_file(SelectedFile::new("a.txt", "a"), FileMetadata::default())
            .await
            .expect("a");
        let second = ingest_file(SelectedFile::new("b.txt", "b"), FileMetadata::default())
            .await
            .expect("b");
        assert_ne!(first.id, second.id);
        assert!(first.timestamp > 0);
    }

    #[test]
    fn selection_expands_directories_in_sorted_order() {
        let root = std::env::temp_dir().join(format!("indicator-desk-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(root.join("nested")).expect("dirs");
        std::fs::write(root.join("b.txt"), "b").expect("b");
        std::fs::write(root.join("a.csv"), "a").expect("a");
        std::fs::write(root.join("nested").join("c.json"), "{}").expect("c");

        let selected = read_selection(&[root.clone()]).expect("selection");
        let names: Vec<_> = selected.iter().map(|file| file.name.as_str()).collect();
        assert_eq!(names, ["a.csv", "b.txt", "c.json"]);

        std::fs::remove_dir_all(root).ok();
    }
}
