//! Bearer-token source consumed by the job client.
//!
//! Session management lives elsewhere; the job client only needs a way
//! to obtain the current token before each handshake and REST call.

use async_trait::async_trait;

use crate::error::CoreError;

/// Supplies the bearer token attached to hub handshakes and REST calls.
///
/// Called before every connection attempt, so implementations backed
/// by a refreshing session always hand out a fresh token.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn bearer_token(&self) -> Result<String, CoreError>;
}

/// A fixed token, e.g. read once from the environment.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn bearer_token(&self) -> Result<String, CoreError> {
        if self.0.is_empty() {
            return Err(CoreError::Unauthorized("No auth token configured".into()));
        }
        Ok(self.0.clone())
    }
}
