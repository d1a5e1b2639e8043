pub mod chunk;
pub mod chunker;
pub mod reader;

pub use chunk::Chunk;
pub use chunker::{Chunker, ChunkerConfig, chunk};
pub use reader::FileReader;

use common::Result;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::debug;

/// Generate a stable source ID from a file path
pub fn generate_source_id(path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..16])
}

/// A file read from disk and split into ingestible texts.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub source_id: String,
    pub path: String,
    pub chunks: Vec<Chunk>,
}

impl LoadedDocument {
    pub fn texts(&self) -> Vec<String> {
        self.chunks.iter().map(|c| c.text.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Read a UTF-8 file and optionally chunk it.
///
/// Without a chunker config the whole file becomes one text. Whitespace-only
/// files yield an empty document.
pub fn load_document(path: &Path, chunking: Option<ChunkerConfig>) -> Result<LoadedDocument> {
    let content = FileReader::read_file(path)?;
    let path_str = path.to_string_lossy().to_string();
    let source_id = generate_source_id(&path_str);

    let chunks = if content.trim().is_empty() {
        Vec::new()
    } else {
        match chunking {
            Some(config) if config.chunk_size > 0 => {
                Chunker::new(config).chunk_text(&source_id, &content)
            }
            _ => vec![Chunk::new(content, source_id.clone(), 0)],
        }
    };

    debug!(path = %path_str, chunks = chunks.len(), "Loaded document");

    Ok(LoadedDocument {
        source_id,
        path: path_str,
        chunks,
    })
}
