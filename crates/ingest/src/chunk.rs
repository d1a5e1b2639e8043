use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A bounded text segment handed to the vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source_id: String,
    pub sequence_index: usize,
}

impl Chunk {
    pub fn new(text: String, source_id: String, sequence_index: usize) -> Self {
        Self {
            text,
            source_id,
            sequence_index,
        }
    }

    /// Stable id derived from the source and position of the chunk
    pub fn chunk_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source_id.as_bytes());
        hasher.update(self.sequence_index.to_string().as_bytes());
        hasher.update(self.text.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16]) // Use first 16 bytes (32 hex chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_is_stable() {
        let a = Chunk::new("hello".to_string(), "doc".to_string(), 0);
        let b = Chunk::new("hello".to_string(), "doc".to_string(), 0);
        let c = Chunk::new("hello".to_string(), "doc".to_string(), 1);

        assert_eq!(a.chunk_id(), b.chunk_id());
        assert_ne!(a.chunk_id(), c.chunk_id());
        assert_eq!(a.chunk_id().len(), 32);
    }
}
