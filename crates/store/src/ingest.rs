//! Document ingestion: read `.txt`/`.md`/`.pdf` files, chunk them, write
//! them into a store.
//!
//! A file's source name is its path relative to the ingest root, and chunk
//! ids are `{source}#{index}`. Re-ingesting a file drops every chunk it had
//! before, so a shrunken file leaves nothing stale behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use carwise_core::error::StoreError;
use carwise_core::store::{ChunkRecord, DocumentStore};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::chunker::{split_text, ChunkConfig};

/// File extensions the ingestor accepts.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "pdf"];

#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    /// (source name, chunks written)
    pub files: Vec<(String, usize)>,
    /// (path, reason) for files that were not ingested
    pub skipped: Vec<(PathBuf, String)>,
}

impl IngestReport {
    pub fn total_chunks(&self) -> usize {
        self.files.iter().map(|(_, n)| n).sum()
    }
}

pub struct Ingestor {
    store: Arc<dyn DocumentStore>,
    chunking: ChunkConfig,
}

impl Ingestor {
    pub fn new(store: Arc<dyn DocumentStore>, chunking: ChunkConfig) -> Self {
        Self { store, chunking }
    }

    /// Ingest a single file or every supported file under a directory.
    pub async fn ingest_path(
        &self,
        path: &Path,
        description: Option<&str>,
    ) -> Result<IngestReport, StoreError> {
        if !path.exists() {
            return Err(StoreError::Storage(format!("{} does not exist", path.display())));
        }

        let (root, mut files): (&Path, Vec<PathBuf>) = if path.is_dir() {
            let files = WalkDir::new(path)
                .into_iter()
                .filter_map(|entry| match entry {
                    Ok(e) if e.file_type().is_file() => Some(e.into_path()),
                    Ok(_) => None,
                    Err(e) => {
                        warn!(error = %e, "Skipping unreadable directory entry");
                        None
                    }
                })
                .collect();
            (path, files)
        } else {
            (path.parent().unwrap_or(Path::new("")), vec![path.to_path_buf()])
        };
        // Deterministic order
        files.sort();

        let mut report = IngestReport::default();
        for file in files {
            if !is_supported(&file) {
                report.skipped.push((file, "unsupported file type".into()));
                continue;
            }
            let source = source_name(root, &file);
            match self.ingest_file(&file, &source, description).await {
                Ok(0) => report.skipped.push((file, "no text content".into())),
                Ok(n) => report.files.push((source, n)),
                Err(StoreError::Storage(reason)) => report.skipped.push((file, reason)),
                Err(e) => return Err(e),
            }
        }

        info!(
            files = report.files.len(),
            chunks = report.total_chunks(),
            skipped = report.skipped.len(),
            "Ingestion finished"
        );
        Ok(report)
    }

    async fn ingest_file(
        &self,
        path: &Path,
        source: &str,
        description: Option<&str>,
    ) -> Result<usize, StoreError> {
        let text = read_document(path).await?;

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| source.to_string());

        let chunks = split_text(&text, self.chunking);
        let total = chunks.len();
        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let mut metadata = serde_json::Map::new();
                metadata.insert("filename".into(), filename.clone().into());
                metadata.insert("chunk_index".into(), i.into());
                metadata.insert("chunk_size".into(), text.chars().count().into());
                metadata.insert("total_chunks".into(), total.into());
                if let Some(d) = description.filter(|d| !d.is_empty()) {
                    metadata.insert("description".into(), d.into());
                }
                ChunkRecord {
                    id: format!("{source}#{i}"),
                    text,
                    source: source.to_string(),
                    metadata,
                    embedding: None,
                }
            })
            .collect();

        // An emptied file still clears what it used to contribute
        let written = self.store.replace_source(source, records).await?;
        debug!(source, chunks = written, "File ingested");
        Ok(written)
    }
}

/// Plain text for one file; PDFs go through `pdf-extract` off the async runtime.
async fn read_document(path: &Path) -> Result<String, StoreError> {
    if !has_extension(path, "pdf") {
        return tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::Storage(format!("cannot read {}: {e}", path.display())));
    }

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| StoreError::Storage(format!("cannot read {}: {e}", path.display())))?;
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| StoreError::Storage(format!("PDF extraction aborted for {}: {e}", path.display())))?
        .map_err(|e| StoreError::Storage(format!("cannot extract text from {}: {e}", path.display())))?;

    if text.trim().is_empty() {
        warn!(path = %path.display(), "No text extracted from PDF, it may be a scanned document");
    }
    Ok(text)
}

/// `file` relative to `root`, with `/` separators on every platform.
fn source_name(root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file);
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        file.display().to_string()
    } else {
        parts.join("/")
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn is_supported(path: &Path) -> bool {
    SUPPORTED_EXTENSIONS.iter().any(|ext| has_extension(path, ext))
}
