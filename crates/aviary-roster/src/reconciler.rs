//! Add/remove reconciliation between local roster records and the external
//! account-linking service.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use aviary_core::now_utc;
use aviary_store::{next_record_id, BotRecord, PlayerRecord, RecordStore};

use crate::duration::{parse_duration_token, InvalidDurationToken};
use crate::linker::{AccountLinker, LinkStatus, PlayerIdentity};

/// Result of a single roster add. `player` is present exactly when the
/// external system confirmed the relationship and the record was persisted.
#[derive(Debug, Clone, Serialize)]
pub struct RosterAddOutcome {
    pub ok: bool,
    pub message: String,
    pub identity: PlayerIdentity,
    pub player: Option<PlayerRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RosterRemoveOutcome {
    pub ok: bool,
    pub message: String,
}

/// Per-element failure in a bulk operation.
#[derive(Debug, Clone, Serialize)]
pub struct BulkFailure {
    pub uid: String,
    pub name: String,
    pub message: String,
}

/// Outcome of a bulk add or remove. Elements are independent: every input
/// lands in exactly one of the two collections.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkReport {
    pub completed: Vec<PlayerRecord>,
    pub failed: Vec<BulkFailure>,
}

/// Performs relationship changes against the external system and mirrors
/// confirmed outcomes into the record store.
pub struct RosterReconciler {
    store: Arc<RecordStore>,
    linker: Arc<dyn AccountLinker>,
}

impl RosterReconciler {
    pub fn new(store: Arc<RecordStore>, linker: Arc<dyn AccountLinker>) -> Self {
        Self { store, linker }
    }

    /// Adds `target_uid` to the bot's roster. The duration token is
    /// validated before any collaborator call; a record is persisted only
    /// after the establish call confirms success.
    pub async fn add(
        &self,
        bot: &BotRecord,
        target_uid: &str,
        duration_token: &str,
    ) -> Result<RosterAddOutcome, InvalidDurationToken> {
        let ttl = parse_duration_token(duration_token)?;
        Ok(self.add_parsed(bot, target_uid, duration_token, ttl).await)
    }

    /// Removes the relationship backing `player`. Confirmed removal and
    /// "relationship not found" both delete the local record.
    pub async fn remove(&self, bot: &BotRecord, player: &PlayerRecord) -> RosterRemoveOutcome {
        let session_token = match self
            .linker
            .authenticate(&bot.account_uid, &bot.account_credential)
            .await
        {
            Ok(token) => token,
            Err(error) => {
                return RosterRemoveOutcome {
                    ok: false,
                    message: error.to_string(),
                }
            }
        };
        let reply = match self
            .linker
            .dissolve_relationship(&session_token, &player.uid)
            .await
        {
            Ok(reply) => reply,
            Err(error) => {
                return RosterRemoveOutcome {
                    ok: false,
                    message: error.to_string(),
                }
            }
        };

        match reply.status {
            LinkStatus::Confirmed | LinkStatus::NotFound => {
                if reply.status == LinkStatus::NotFound {
                    debug!(
                        player_uid = %player.uid,
                        "relationship already absent externally; deleting local record"
                    );
                }
                let deleted = self
                    .store
                    .update_players(|players| players.retain(|record| record.id != player.id));
                match deleted {
                    Ok(()) => RosterRemoveOutcome {
                        ok: true,
                        message: reply.message,
                    },
                    Err(error) => RosterRemoveOutcome {
                        ok: false,
                        message: format!(
                            "relationship dissolved but deleting the roster entry failed: {error}"
                        ),
                    },
                }
            }
            LinkStatus::Rejected => RosterRemoveOutcome {
                ok: false,
                message: reply.message,
            },
        }
    }

    /// Applies the single-item add contract per element. Each success
    /// persists immediately; a failing element never blocks the rest.
    pub async fn add_many(
        &self,
        bot: &BotRecord,
        target_uids: &[String],
        duration_token: &str,
    ) -> Result<BulkReport, InvalidDurationToken> {
        let ttl = parse_duration_token(duration_token)?;
        let mut report = BulkReport::default();
        for target_uid in target_uids {
            let outcome = self.add_parsed(bot, target_uid, duration_token, ttl).await;
            match outcome.player {
                Some(player) => report.completed.push(player),
                None => report.failed.push(BulkFailure {
                    uid: target_uid.clone(),
                    name: outcome.identity.name,
                    message: outcome.message,
                }),
            }
        }
        Ok(report)
    }

    /// Applies the single-item remove contract per element by roster entry
    /// id. Unknown ids count as failed elements rather than being skipped.
    pub async fn remove_many(&self, bot: &BotRecord, player_ids: &[u64]) -> BulkReport {
        let players = self.store.load_players();
        let mut report = BulkReport::default();
        for player_id in player_ids {
            let Some(player) = players
                .iter()
                .find(|record| record.id == *player_id && record.bot_uid == bot.account_uid)
            else {
                report.failed.push(BulkFailure {
                    uid: player_id.to_string(),
                    name: "unknown".to_string(),
                    message: "roster entry not found".to_string(),
                });
                continue;
            };
            let outcome = self.remove(bot, player).await;
            if outcome.ok {
                report.completed.push(player.clone());
            } else {
                report.failed.push(BulkFailure {
                    uid: player.uid.clone(),
                    name: player.name.clone(),
                    message: outcome.message,
                });
            }
        }
        report
    }

    /// Resolves display attributes, defaulting to "unknown" fields when the
    /// lookup fails.
    pub async fn resolve_identity_best_effort(&self, target_uid: &str) -> PlayerIdentity {
        match self.linker.resolve_identity(target_uid).await {
            Ok(identity) => identity,
            Err(error) => {
                warn!(target_uid, %error, "identity lookup failed; using defaults");
                PlayerIdentity::unknown()
            }
        }
    }

    async fn add_parsed(
        &self,
        bot: &BotRecord,
        target_uid: &str,
        duration_token: &str,
        ttl: chrono::Duration,
    ) -> RosterAddOutcome {
        let failed = |message: String, identity: PlayerIdentity| RosterAddOutcome {
            ok: false,
            message,
            identity,
            player: None,
        };

        let session_token = match self
            .linker
            .authenticate(&bot.account_uid, &bot.account_credential)
            .await
        {
            Ok(token) => token,
            Err(error) => return failed(error.to_string(), PlayerIdentity::unknown()),
        };
        let reply = match self
            .linker
            .establish_relationship(&session_token, target_uid)
            .await
        {
            Ok(reply) => reply,
            Err(error) => {
                let identity = self.resolve_identity_best_effort(target_uid).await;
                return failed(error.to_string(), identity);
            }
        };
        let identity = self.resolve_identity_best_effort(target_uid).await;
        if reply.status != LinkStatus::Confirmed {
            return failed(reply.message, identity);
        }

        let added_at = now_utc();
        let expires_at = added_at + ttl;
        let persisted = self.store.update_players(|players| {
            let record = PlayerRecord {
                id: next_record_id(players.iter().map(|record| record.id)),
                bot_uid: bot.account_uid.clone(),
                bot_id: bot.id,
                uid: target_uid.to_string(),
                name: identity.name.clone(),
                region: identity.region.clone(),
                level: identity.level.clone(),
                added_at,
                expires_at,
                duration: duration_token.to_string(),
                status: "added".to_string(),
            };
            players.push(record.clone());
            record
        });
        match persisted {
            Ok(player) => RosterAddOutcome {
                ok: true,
                message: reply.message,
                identity,
                player: Some(player),
            },
            Err(error) => failed(
                format!("relationship confirmed but persisting the roster entry failed: {error}"),
                identity,
            ),
        }
    }
}
