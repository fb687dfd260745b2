//! Interface to the external account-linking collaborator.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Failure kinds for collaborator calls. Messages are surfaced to the user
/// verbatim so external-system issues can be diagnosed without log access.
#[derive(Debug, Clone, Error)]
pub enum LinkerError {
    #[error("authentication with the account provider failed: {0}")]
    AuthenticationFailed(String),
    #[error("account provider request timed out")]
    Timeout,
    #[error("account provider transport error: {0}")]
    Transport(String),
    #[error("account provider returned a malformed reply: {0}")]
    MalformedReply(String),
}

/// Collaborator verdict on a relationship operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// The operation was applied on the external system.
    Confirmed,
    /// The relationship does not exist on the external system.
    NotFound,
    /// The external system refused the operation.
    Rejected,
}

#[derive(Debug, Clone)]
pub struct LinkReply {
    pub status: LinkStatus,
    pub message: String,
}

/// Display attributes of an external account, resolved best-effort.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerIdentity {
    pub name: String,
    pub region: String,
    pub level: String,
}

impl PlayerIdentity {
    pub fn unknown() -> Self {
        Self {
            name: "unknown".to_string(),
            region: "unknown".to_string(),
            level: "unknown".to_string(),
        }
    }
}

/// The external system that authenticates game accounts and performs
/// friend-relationship establishment, dissolution, and lookup.
///
/// Every call can fail independently; the only ordering the core imposes is
/// authenticate before establish/dissolve.
#[async_trait]
pub trait AccountLinker: Send + Sync {
    async fn authenticate(
        &self,
        account_uid: &str,
        credential: &str,
    ) -> Result<String, LinkerError>;

    async fn establish_relationship(
        &self,
        session_token: &str,
        target_uid: &str,
    ) -> Result<LinkReply, LinkerError>;

    async fn dissolve_relationship(
        &self,
        session_token: &str,
        target_uid: &str,
    ) -> Result<LinkReply, LinkerError>;

    async fn resolve_identity(&self, target_uid: &str) -> Result<PlayerIdentity, LinkerError>;
}
