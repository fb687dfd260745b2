//! Bot CRUD and lifecycle endpoints.

use std::sync::Arc;

use axum::extract::{Path as AxumPath, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use aviary_core::now_utc;
use aviary_store::{admit_new_bot, next_record_id, BotRecord, BotStatus, QuotaDecision, TenantRecord};
use aviary_supervisor::{BotProvisionSpec, ControlOutcome};

use crate::auth::authorize;
use crate::error::ApiError;
use crate::state::AppState;
use crate::tenants_api::validate_path_component;

#[derive(Debug, Deserialize)]
pub(crate) struct CreateBotRequest {
    pub account_uid: String,
    pub account_credential: String,
    pub name: String,
    pub display_name: String,
}

pub(crate) async fn handle_bot_create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateBotRequest>,
) -> Response {
    let tenant = match authorize(&state, &headers) {
        Ok(tenant) => tenant,
        Err(error) => return error.into_response(),
    };
    match create_bot_for_tenant(&state, &tenant, &request) {
        Ok(bot) => Json(json!({
            "ok": true,
            "message": "bot created",
            "bot": bot_view(&bot),
        }))
        .into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn handle_bot_list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let tenant = match authorize(&state, &headers) {
        Ok(tenant) => tenant,
        Err(error) => return error.into_response(),
    };
    let bots = state
        .store
        .load_bots()
        .iter()
        .filter(|bot| tenant.is_admin || bot.tenant_id == tenant.id)
        .map(bot_view)
        .collect::<Vec<_>>();
    Json(json!({ "ok": true, "bots": bots })).into_response()
}

pub(crate) async fn handle_bot_detail(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(bot_id): AxumPath<u64>,
) -> Response {
    let tenant = match authorize(&state, &headers) {
        Ok(tenant) => tenant,
        Err(error) => return error.into_response(),
    };
    let bot = match find_authorized_bot(&state, &tenant, bot_id) {
        Ok(bot) => bot,
        Err(error) => return error.into_response(),
    };
    let players = state
        .store
        .load_players()
        .into_iter()
        .filter(|player| player.bot_id == bot.id)
        .collect::<Vec<_>>();
    Json(json!({ "ok": true, "bot": bot_view(&bot), "players": players })).into_response()
}

pub(crate) async fn handle_bot_start(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(bot_id): AxumPath<u64>,
) -> Response {
    lifecycle_action(&state, &headers, bot_id, LifecycleAction::Start).await
}

pub(crate) async fn handle_bot_stop(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(bot_id): AxumPath<u64>,
) -> Response {
    lifecycle_action(&state, &headers, bot_id, LifecycleAction::Stop).await
}

pub(crate) async fn handle_bot_restart(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(bot_id): AxumPath<u64>,
) -> Response {
    lifecycle_action(&state, &headers, bot_id, LifecycleAction::Restart).await
}

pub(crate) async fn handle_bot_delete(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(bot_id): AxumPath<u64>,
) -> Response {
    let tenant = match authorize(&state, &headers) {
        Ok(tenant) => tenant,
        Err(error) => return error.into_response(),
    };
    let bot = match find_authorized_bot(&state, &tenant, bot_id) {
        Ok(bot) => bot,
        Err(error) => return error.into_response(),
    };
    match delete_bot_cascade(&state, &bot).await {
        Ok(()) => Json(json!({ "ok": true, "message": "bot deleted" })).into_response(),
        Err(error) => error.into_response(),
    }
}

enum LifecycleAction {
    Start,
    Stop,
    Restart,
}

async fn lifecycle_action(
    state: &Arc<AppState>,
    headers: &HeaderMap,
    bot_id: u64,
    action: LifecycleAction,
) -> Response {
    let tenant = match authorize(state, headers) {
        Ok(tenant) => tenant,
        Err(error) => return error.into_response(),
    };
    let bot = match find_authorized_bot(state, &tenant, bot_id) {
        Ok(bot) => bot,
        Err(error) => return error.into_response(),
    };
    let owner = match owner_of(state, &bot) {
        Ok(owner) => owner,
        Err(error) => return error.into_response(),
    };
    let instance_dir = state.bot_instance_dir(&owner, &bot.account_uid);

    let outcome = match action {
        LifecycleAction::Start => state.supervisor.start(bot.id, &instance_dir).await,
        LifecycleAction::Stop => state.supervisor.stop(bot.id, bot.pid).await,
        LifecycleAction::Restart => state.supervisor.restart(bot.id, &instance_dir, bot.pid).await,
    };

    // A failed start leaves the record exactly as it was; every other
    // outcome is persisted as the bot's new terminal state.
    if let LifecycleAction::Start = action {
        if !outcome.ok {
            return ApiError::process_control(outcome.message).into_response();
        }
    }
    match persist_control_outcome(state, bot.id, &outcome) {
        Ok(status) => {
            if outcome.ok {
                Json(json!({
                    "ok": true,
                    "message": outcome.message,
                    "status": status.as_str(),
                    "pid": outcome.pid,
                }))
                .into_response()
            } else {
                ApiError::process_control(outcome.message).into_response()
            }
        }
        Err(error) => error.into_response(),
    }
}

/// Writes the supervisor outcome into the bot record: a pid means running,
/// no pid means stopped with the pid cleared.
fn persist_control_outcome(
    state: &AppState,
    bot_id: u64,
    outcome: &ControlOutcome,
) -> Result<BotStatus, ApiError> {
    let status = match outcome.pid {
        Some(_) => BotStatus::Running,
        None => BotStatus::Stopped,
    };
    state
        .store
        .update_bots(|bots| {
            if let Some(record) = bots.iter_mut().find(|record| record.id == bot_id) {
                record.status = status;
                record.pid = outcome.pid;
            }
        })
        .map_err(|error| ApiError::internal(format!("failed to persist bots: {error}")))?;
    Ok(status)
}

/// Quota check, instance provisioning, and record insert, all under the
/// bots-collection lock so concurrent creates cannot overshoot the quota.
pub(crate) fn create_bot_for_tenant(
    state: &AppState,
    tenant: &TenantRecord,
    request: &CreateBotRequest,
) -> Result<BotRecord, ApiError> {
    validate_path_component(&request.account_uid, "account_uid")?;
    if request.name.is_empty() || request.display_name.is_empty() {
        return Err(ApiError::invalid_input("name and display_name are required"));
    }

    let created = state
        .store
        .update_bots(|bots| {
            let owned_now = bots
                .iter()
                .filter(|bot| bot.tenant_id == tenant.id)
                .count() as u64;
            if let QuotaDecision::Exceeded { max_bots, .. } =
                admit_new_bot(tenant.max_bots, owned_now)
            {
                return Err(ApiError::quota_exceeded(format!(
                    "tenant '{}' already runs its maximum of {max_bots} bots",
                    tenant.login
                )));
            }
            if bots
                .iter()
                .any(|bot| bot.tenant_id == tenant.id && bot.account_uid == request.account_uid)
            {
                return Err(ApiError::invalid_input(format!(
                    "a bot for account '{}' already exists",
                    request.account_uid
                )));
            }

            let instance_dir = state.bot_instance_dir(tenant, &request.account_uid);
            state
                .provisioner
                .provision(
                    &instance_dir,
                    &BotProvisionSpec {
                        account_uid: request.account_uid.clone(),
                        account_credential: request.account_credential.clone(),
                        name: request.name.clone(),
                        display_name: request.display_name.clone(),
                    },
                )
                .map_err(|error| {
                    ApiError::process_control(format!("failed to provision bot instance: {error}"))
                })?;

            let record = BotRecord {
                id: next_record_id(bots.iter().map(|bot| bot.id)),
                tenant_id: tenant.id,
                account_uid: request.account_uid.clone(),
                account_credential: request.account_credential.clone(),
                name: request.name.clone(),
                display_name: request.display_name.clone(),
                status: BotStatus::Stopped,
                pid: None,
                created_at: now_utc(),
            };
            bots.push(record.clone());
            Ok(record)
        })
        .map_err(|error| ApiError::internal(format!("failed to persist bots: {error}")))??;

    info!(bot_id = created.id, tenant_id = tenant.id, "bot created");
    Ok(created)
}

/// Best-effort stop, instance storage removal, then the bot's roster
/// entries and record.
pub(crate) async fn delete_bot_cascade(state: &AppState, bot: &BotRecord) -> Result<(), ApiError> {
    let owner = owner_of(state, bot)?;
    let instance_dir = state.bot_instance_dir(&owner, &bot.account_uid);
    let outcome = state.supervisor.retire(bot.id, &instance_dir, bot.pid).await;
    if !outcome.ok {
        return Err(ApiError::process_control(outcome.message));
    }
    state
        .store
        .update_players(|players| players.retain(|player| player.bot_id != bot.id))
        .map_err(|error| ApiError::internal(format!("failed to persist players: {error}")))?;
    state
        .store
        .update_bots(|bots| bots.retain(|record| record.id != bot.id))
        .map_err(|error| ApiError::internal(format!("failed to persist bots: {error}")))?;
    info!(bot_id = bot.id, "bot deleted");
    Ok(())
}

/// Looks the bot up and enforces ownership: tenants may only reach their
/// own bots, administrators may reach any.
pub(crate) fn find_authorized_bot(
    state: &AppState,
    tenant: &TenantRecord,
    bot_id: u64,
) -> Result<BotRecord, ApiError> {
    let bot = state
        .store
        .load_bots()
        .into_iter()
        .find(|bot| bot.id == bot_id)
        .ok_or_else(|| ApiError::not_found(format!("bot {bot_id} not found")))?;
    if !tenant.is_admin && bot.tenant_id != tenant.id {
        return Err(ApiError::forbidden("this bot belongs to another tenant"));
    }
    Ok(bot)
}

pub(crate) fn owner_of(state: &AppState, bot: &BotRecord) -> Result<TenantRecord, ApiError> {
    state
        .store
        .load_tenants()
        .into_iter()
        .find(|tenant| tenant.id == bot.tenant_id)
        .ok_or_else(|| {
            ApiError::not_found(format!("owning tenant {} not found", bot.tenant_id))
        })
}

pub(crate) fn bot_view(bot: &BotRecord) -> Value {
    json!({
        "id": bot.id,
        "tenant_id": bot.tenant_id,
        "account_uid": bot.account_uid,
        "name": bot.name,
        "display_name": bot.display_name,
        "status": bot.status.as_str(),
        "pid": bot.pid,
        "created_at": bot.created_at,
    })
}
