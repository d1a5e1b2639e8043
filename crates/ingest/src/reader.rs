use common::{RagError, Result};
use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

pub struct FileReader;

impl FileReader {
    /// Read a whole file as UTF-8 text.
    pub fn read_file(path: &Path) -> Result<String> {
        if !path.exists() {
            return Err(RagError::ingestion(format!(
                "File not found: {}",
                path.display()
            )));
        }
        if !path.is_file() {
            return Err(RagError::ingestion(format!(
                "Path is not a file: {}",
                path.display()
            )));
        }

        let bytes = std::fs::read(path).map_err(|e| {
            RagError::ingestion(format!("Failed to read file {}: {}", path.display(), e))
        })?;

        String::from_utf8(bytes).map_err(|e| {
            RagError::ingestion(format!(
                "Failed to decode file {} as UTF-8: {}",
                path.display(),
                e
            ))
        })
    }

    /// List files under `dir` whose file name matches `pattern` (e.g. `*.txt`).
    ///
    /// Results are sorted so ingestion order is reproducible.
    pub fn read_directory(dir: &Path, pattern: &str, recursive: bool) -> Result<Vec<PathBuf>> {
        if !dir.exists() {
            return Err(RagError::ingestion(format!(
                "Directory not found: {}",
                dir.display()
            )));
        }
        if !dir.is_dir() {
            return Err(RagError::ingestion(format!(
                "Path is not a directory: {}",
                dir.display()
            )));
        }

        let matcher = Pattern::new(pattern)
            .map_err(|e| RagError::validation(format!("Invalid file pattern '{}': {}", pattern, e)))?;

        let walker = if recursive {
            WalkDir::new(dir)
        } else {
            WalkDir::new(dir).max_depth(1)
        };

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| {
                RagError::ingestion(format!("Failed to walk {}: {}", dir.display(), e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if matcher.matches(name) {
                    files.push(entry.into_path());
                }
            }
        }

        files.sort();
        debug!(dir = %dir.display(), pattern, count = files.len(), "Listed matching files");
        Ok(files)
    }
}
