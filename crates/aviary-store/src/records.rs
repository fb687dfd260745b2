//! Persisted record shapes for the four Aviary collections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a supervised bot process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotStatus {
    Stopped,
    Running,
}

impl BotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
        }
    }
}

/// An account holder who owns zero or more bots, subject to a quota.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub id: u64,
    pub login: String,
    pub password_digest: String,
    pub max_bots: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_admin: bool,
    #[serde(default)]
    pub contact: Option<String>,
}

/// A supervised child process bound to one external game account.
///
/// `status == Running` holds exactly when `pid` is present and the process
/// was last observed alive; a stopped bot always carries `pid = None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotRecord {
    pub id: u64,
    pub tenant_id: u64,
    pub account_uid: String,
    pub account_credential: String,
    pub name: String,
    pub display_name: String,
    pub status: BotStatus,
    pub pid: Option<u32>,
    pub created_at: DateTime<Utc>,
}

/// A roster entry: a secondary account a bot has friended externally.
///
/// A record exists only after the external system confirmed the add, and is
/// removed once the external system confirms removal (or reports the
/// relationship absent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: u64,
    pub bot_uid: String,
    pub bot_id: u64,
    pub uid: String,
    pub name: String,
    pub region: String,
    pub level: String,
    pub added_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub duration: String,
    pub status: String,
}

/// Operator-curated reference link shown to tenants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub id: u64,
    pub name: String,
    pub url: String,
    pub icon: String,
    pub created_at: DateTime<Utc>,
}

/// Allocates the next identifier for a collection as max(existing) + 1.
///
/// Length-based allocation would recycle ids after deletions.
pub fn next_record_id(existing: impl IntoIterator<Item = u64>) -> u64 {
    existing.into_iter().max().unwrap_or(0) + 1
}
