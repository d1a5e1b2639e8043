//! Ingesting UTF-8 text files and directories of them.

use common::Result;
use ingest::{ChunkerConfig, FileReader, load_document};
use serde::Deserialize;
use std::path::Path;
use tracing::{error, info, warn};

use crate::{IngestReport, Ragforge};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileIngestOptions {
    /// Split into windows of this many characters; `None` or 0 keeps the
    /// file whole
    pub chunk_size: Option<usize>,
    pub chunk_overlap: usize,
    pub use_graph: Option<bool>,
}

impl FileIngestOptions {
    fn chunking(&self) -> Option<ChunkerConfig> {
        self.chunk_size
            .filter(|size| *size > 0)
            .map(|chunk_size| ChunkerConfig {
                chunk_size,
                overlap: self.chunk_overlap,
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DirectoryIngestOptions {
    /// Glob matched against file names
    pub pattern: String,
    pub recursive: bool,
    pub chunk_size: Option<usize>,
    pub chunk_overlap: usize,
    pub use_graph: Option<bool>,
}

impl Default for DirectoryIngestOptions {
    fn default() -> Self {
        Self {
            pattern: "*.txt".to_string(),
            recursive: true,
            chunk_size: None,
            chunk_overlap: 0,
            use_graph: None,
        }
    }
}

impl DirectoryIngestOptions {
    fn file_options(&self) -> FileIngestOptions {
        FileIngestOptions {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            use_graph: self.use_graph,
        }
    }
}

impl Ragforge {
    /// Read a file, optionally chunk it, and ingest the pieces.
    ///
    /// Returns `None` when the file only holds whitespace.
    pub async fn ingest_from_file(
        &self,
        path: impl AsRef<Path>,
        options: &FileIngestOptions,
    ) -> Result<Option<IngestReport>> {
        let path = path.as_ref();
        let document = load_document(path, options.chunking())?;

        if document.is_empty() {
            warn!(path = %path.display(), "File is empty. Skipping ingestion");
            return Ok(None);
        }
        if options.chunking().is_some() {
            info!(path = %path.display(), chunks = document.chunks.len(), "Split file into chunks");
        }

        let report = self
            .ingest_chunks(&document.chunks, &document.path, options.use_graph)
            .await?;
        self.metrics.record_files(1);

        info!(
            path = %path.display(),
            documents = report.ids.len(),
            "Successfully ingested file"
        );
        Ok(Some(report))
    }

    /// Ingest a file split into `chunk_size` windows that share `gap_size`
    /// characters.
    pub async fn ingest_file(
        &self,
        path: impl AsRef<Path>,
        chunk_size: usize,
        gap_size: usize,
        use_graph: Option<bool>,
    ) -> Result<Option<IngestReport>> {
        self.ingest_from_file(
            path,
            &FileIngestOptions {
                chunk_size: Some(chunk_size),
                chunk_overlap: gap_size,
                use_graph,
            },
        )
        .await
    }

    /// Ingest every matching file below `dir`. Per-file failures are logged
    /// and skipped; returns how many files were ingested.
    pub async fn ingest_from_directory(
        &self,
        dir: impl AsRef<Path>,
        options: &DirectoryIngestOptions,
    ) -> Result<usize> {
        let dir = dir.as_ref();
        let files = FileReader::read_directory(dir, &options.pattern, options.recursive)?;

        if files.is_empty() {
            warn!(
                dir = %dir.display(),
                pattern = %options.pattern,
                "No files matching pattern"
            );
            return Ok(0);
        }
        info!(count = files.len(), pattern = %options.pattern, "Found matching files");

        let file_options = options.file_options();
        let mut success_count = 0;
        for file in &files {
            match self.ingest_from_file(file, &file_options).await {
                Ok(_) => success_count += 1,
                Err(e) => error!(path = %file.display(), error = %e, "Failed to ingest file"),
            }
        }

        info!(
            ingested = success_count,
            total = files.len(),
            "Finished directory ingestion"
        );
        Ok(success_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{memory_ragforge, scripted_model};
    use common::RagError;
    use std::fs;

    #[tokio::test]
    async fn test_ingest_from_file_whole_and_chunked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "abcdefghij").unwrap();

        let ragforge = memory_ragforge(scripted_model(), false);
        let whole = ragforge
            .ingest_from_file(&path, &FileIngestOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(whole.ids.len(), 1);

        let chunked = ragforge.ingest_file(&path, 4, 0, None).await.unwrap().unwrap();
        assert_eq!(chunked.ids.len(), 3);
        assert_eq!(ragforge.vector_store().await.unwrap().count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_chunks_are_tagged_with_their_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "alpha note").unwrap();
        fs::write(&b, "alpha memo").unwrap();

        let ragforge = memory_ragforge(scripted_model(), false);
        for path in [&a, &b] {
            ragforge
                .ingest_from_file(path, &FileIngestOptions::default())
                .await
                .unwrap();
        }

        let filter = crate::PayloadFilter::new().with("source", b.to_string_lossy().to_string());
        let found = ragforge.search("alpha", 5, Some(&filter)).await.unwrap();
        assert_eq!(found, vec!["alpha memo".to_string()]);
    }

    #[tokio::test]
    async fn test_blank_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.txt");
        fs::write(&path, " \n\n ").unwrap();

        let ragforge = memory_ragforge(scripted_model(), false);
        let report = ragforge
            .ingest_from_file(&path, &FileIngestOptions::default())
            .await
            .unwrap();
        assert!(report.is_none());
    }

    #[tokio::test]
    async fn test_file_errors_are_ingestion_errors() {
        let dir = tempfile::tempdir().unwrap();
        let ragforge = memory_ragforge(scripted_model(), false);

        let missing = ragforge
            .ingest_from_file(dir.path().join("missing.txt"), &FileIngestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(missing, RagError::Ingestion(_)));

        let not_a_file = ragforge
            .ingest_from_file(dir.path(), &FileIngestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(not_a_file, RagError::Ingestion(_)));

        let binary = dir.path().join("binary.txt");
        fs::write(&binary, [0xff, 0xfe, 0x00, 0xc3]).unwrap();
        let undecodable = ragforge
            .ingest_from_file(&binary, &FileIngestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(undecodable, RagError::Ingestion(_)));
    }

    #[tokio::test]
    async fn test_directory_ingestion_counts_successes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("one.txt"), "first document").unwrap();
        fs::write(dir.path().join("nested/two.txt"), "second document").unwrap();
        fs::write(dir.path().join("skip.md"), "markdown is not matched").unwrap();
        fs::write(dir.path().join("bad.txt"), [0xff, 0xfe]).unwrap();

        let ragforge = memory_ragforge(scripted_model(), false);

        let count = ragforge
            .ingest_from_directory(dir.path(), &DirectoryIngestOptions::default())
            .await
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(ragforge.metrics().snapshot().total_files_ingested, 2);

        let shallow = DirectoryIngestOptions {
            recursive: false,
            ..DirectoryIngestOptions::default()
        };
        let count = ragforge
            .ingest_from_directory(dir.path(), &shallow)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_missing_directory_is_ingestion_error() {
        let ragforge = memory_ragforge(scripted_model(), false);
        let err = ragforge
            .ingest_from_directory("/definitely/not/here", &DirectoryIngestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Ingestion(_)));
    }
}
