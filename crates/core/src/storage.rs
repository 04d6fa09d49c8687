//! Object-store collaborator interface.
//!
//! Resume files live in an external blob store. Keys are user-derived,
//! so uploading for the same user overwrites the previous blob.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Default lifetime of a signed download URL (one hour).
pub const DEFAULT_SIGNED_URL_TTL_SECS: u64 = 3600;

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlob {
    /// Object key inside the bucket.
    pub key: String,
    /// Public or signed URL for immediate display.
    pub url: String,
}

/// Blob storage consumed by the resume upload flow.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `bytes` under `key`, replacing any existing object.
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredBlob, CoreError>;

    /// Delete the object stored under `key`.
    async fn delete(&self, key: &str) -> Result<(), CoreError>;

    /// Produce a time-limited download URL, optionally forcing a
    /// download filename.
    async fn signed_url(
        &self,
        key: &str,
        ttl_secs: u64,
        download_filename: Option<&str>,
    ) -> Result<String, CoreError>;
}

/// Build the per-user object key for a resume upload.
///
/// The same user always maps to the same key, which gives the store its
/// overwrite-by-key semantics. Only the extension of `file_name` is kept.
pub fn resume_object_key(user_id: &str, file_name: &str) -> Result<String, CoreError> {
    if user_id.is_empty() {
        return Err(CoreError::Validation("User id must not be empty".into()));
    }
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "pdf".to_string());
    Ok(format!("{user_id}/resume.{ext}"))
}
