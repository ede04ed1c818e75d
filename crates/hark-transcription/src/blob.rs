//! Serialized model bytes shared between runtimes.

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::types::{ResultExt, TranscriptionError};

/// Read-only model bytes plus their SHA-256 digest.
///
/// Cloning is cheap; clones share the same allocation, so several runtimes
/// can load from one blob.
#[derive(Clone)]
pub struct ModelBlob {
    bytes: Arc<[u8]>,
    digest: Arc<str>,
}

impl ModelBlob {
    /// Wrap bytes already in memory.
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        let digest = format!("{:x}", Sha256::digest(&bytes));
        Self {
            bytes,
            digest: digest.into(),
        }
    }

    /// Read a model file. A read failure is a [`TranscriptionError::ModelLoad`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TranscriptionError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).model_load(&format!("read {}", path.display()))?;
        let blob = Self::new(bytes);
        debug!(path = %path.display(), bytes = blob.len(), digest = blob.short_digest(), "read model blob");
        Ok(blob)
    }

    /// Read a model from any byte source.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, TranscriptionError> {
        let mut bytes = Vec::new();
        let _ = reader.read_to_end(&mut bytes).model_load("read model stream")?;
        Ok(Self::new(bytes))
    }

    /// The serialized model.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True for a zero-byte blob.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lowercase hex SHA-256 of the bytes.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// First 12 hex digits of the digest, for logs.
    pub fn short_digest(&self) -> &str {
        &self.digest[..12]
    }
}

impl fmt::Debug for ModelBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBlob")
            .field("len", &self.bytes.len())
            .field("digest", &self.short_digest())
            .finish()
    }
}
