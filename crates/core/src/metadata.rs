//! Profile-metadata collaborator interface.
//!
//! The metadata backend stores one resume/profile document per user and
//! exposes partial updates for file info, visibility and free-form
//! metadata. Payloads arrive in either snake_case or camelCase depending
//! on the server path; [`ProfileMetadata`] accepts both.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

/// The resume + profile document of a single user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileMetadata {
    #[serde(alias = "user_id")]
    pub user_id: String,
    #[serde(default, alias = "file_name")]
    pub file_name: Option<String>,
    #[serde(default, alias = "file_url")]
    pub file_url: Option<String>,
    #[serde(default, alias = "file_key")]
    pub file_key: Option<String>,
    #[serde(default, alias = "file_size")]
    pub file_size: Option<u64>,
    #[serde(default, alias = "is_public")]
    pub is_public: bool,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(
        default,
        alias = "updated_at",
        deserialize_with = "crate::types::deserialize_optional_timestamp"
    )]
    pub updated_at: Option<Timestamp>,
}

/// Partial update for the file-info fields after an upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfoUpdate {
    pub file_name: String,
    pub file_url: String,
    pub file_key: String,
    pub file_size: u64,
}

/// Key-value document store for profile metadata.
///
/// Maps to `GET /profile-metadata`, the three `PATCH` sub-resources and
/// `DELETE /profile-metadata`.
#[async_trait]
pub trait ProfileMetadataStore: Send + Sync {
    /// Fetch the current document, `None` if the user has none yet.
    async fn fetch(&self) -> Result<Option<ProfileMetadata>, CoreError>;

    async fn update_file_info(&self, info: &FileInfoUpdate) -> Result<ProfileMetadata, CoreError>;

    async fn update_visibility(&self, is_public: bool) -> Result<ProfileMetadata, CoreError>;

    async fn update_metadata(
        &self,
        metadata: &serde_json::Value,
    ) -> Result<ProfileMetadata, CoreError>;

    async fn delete(&self) -> Result<(), CoreError>;
}
