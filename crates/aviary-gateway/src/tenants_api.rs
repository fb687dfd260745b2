//! Tenant administration endpoints.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Path as AxumPath, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use aviary_core::{lease_expiry, now_utc};
use aviary_store::{next_record_id, TenantRecord};

use crate::auth::{authorize, password_digest, require_admin};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct CreateTenantRequest {
    pub login: String,
    pub key: String,
    pub max_bots: u64,
    pub lease_days: i64,
    #[serde(default)]
    pub contact: Option<String>,
}

pub(crate) async fn handle_tenant_create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateTenantRequest>,
) -> Response {
    let actor = match authorize(&state, &headers) {
        Ok(tenant) => tenant,
        Err(error) => return error.into_response(),
    };
    if let Err(error) = require_admin(&actor) {
        return error.into_response();
    }
    match create_tenant(&state, &request) {
        Ok(tenant) => Json(json!({ "ok": true, "tenant": tenant_view(&tenant) })).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn handle_tenant_list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let actor = match authorize(&state, &headers) {
        Ok(tenant) => tenant,
        Err(error) => return error.into_response(),
    };
    if let Err(error) = require_admin(&actor) {
        return error.into_response();
    }
    let tenants = state
        .store
        .load_tenants()
        .iter()
        .map(tenant_view)
        .collect::<Vec<_>>();
    Json(json!({ "ok": true, "tenants": tenants })).into_response()
}

pub(crate) async fn handle_tenant_delete(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(tenant_id): AxumPath<u64>,
) -> Response {
    let actor = match authorize(&state, &headers) {
        Ok(tenant) => tenant,
        Err(error) => return error.into_response(),
    };
    if let Err(error) = require_admin(&actor) {
        return error.into_response();
    }
    let Some(target) = state
        .store
        .load_tenants()
        .into_iter()
        .find(|tenant| tenant.id == tenant_id)
    else {
        return ApiError::not_found(format!("tenant {tenant_id} not found")).into_response();
    };
    if target.is_admin {
        return ApiError::invalid_input("administrator tenants cannot be deleted").into_response();
    }
    match delete_tenant_cascade(&state, &target).await {
        Ok(()) => Json(json!({ "ok": true, "message": "tenant deleted" })).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) fn create_tenant(
    state: &AppState,
    request: &CreateTenantRequest,
) -> Result<TenantRecord, ApiError> {
    validate_path_component(&request.login, "login")?;
    if request.key.is_empty() {
        return Err(ApiError::invalid_input("key must not be empty"));
    }
    if request.lease_days <= 0 {
        return Err(ApiError::invalid_input("lease_days must be positive"));
    }

    let created = state
        .store
        .update_tenants(|tenants| {
            if tenants.iter().any(|tenant| tenant.login == request.login) {
                return Err(ApiError::invalid_input(format!(
                    "login '{}' is already in use",
                    request.login
                )));
            }
            let now = now_utc();
            let record = TenantRecord {
                id: next_record_id(tenants.iter().map(|tenant| tenant.id)),
                login: request.login.clone(),
                password_digest: password_digest(&request.key),
                max_bots: request.max_bots,
                created_at: now,
                expires_at: lease_expiry(now, request.lease_days),
                is_admin: false,
                contact: request.contact.clone(),
            };
            tenants.push(record.clone());
            Ok(record)
        })
        .map_err(|error| ApiError::internal(format!("failed to persist tenants: {error}")))??;

    let bots_dir = state.tenant_storage_dir(&created).join("bots");
    if let Err(error) = std::fs::create_dir_all(&bots_dir) {
        warn!(path = %bots_dir.display(), %error, "failed to pre-create tenant storage");
    }
    info!(login = %created.login, id = created.id, "tenant created");
    Ok(created)
}

/// Deletes a tenant and everything it owns: each bot is stopped and its
/// instance storage removed, the bots' roster entries go with them, then
/// the tenant's storage directory and record.
pub(crate) async fn delete_tenant_cascade(
    state: &AppState,
    target: &TenantRecord,
) -> Result<(), ApiError> {
    let owned_bots = state
        .store
        .load_bots()
        .into_iter()
        .filter(|bot| bot.tenant_id == target.id)
        .collect::<Vec<_>>();
    for bot in &owned_bots {
        let instance_dir = state.bot_instance_dir(target, &bot.account_uid);
        let outcome = state.supervisor.retire(bot.id, &instance_dir, bot.pid).await;
        if !outcome.ok {
            warn!(bot_id = bot.id, message = %outcome.message, "retire during tenant delete was degraded");
        }
    }

    let owned_bot_ids = owned_bots.iter().map(|bot| bot.id).collect::<HashSet<_>>();
    state
        .store
        .update_players(|players| players.retain(|player| !owned_bot_ids.contains(&player.bot_id)))
        .map_err(|error| ApiError::internal(format!("failed to persist players: {error}")))?;
    state
        .store
        .update_bots(|bots| bots.retain(|bot| bot.tenant_id != target.id))
        .map_err(|error| ApiError::internal(format!("failed to persist bots: {error}")))?;

    let tenant_dir = state.tenant_storage_dir(target);
    if tenant_dir.exists() {
        if let Err(error) = std::fs::remove_dir_all(&tenant_dir) {
            warn!(path = %tenant_dir.display(), %error, "failed to remove tenant storage");
        }
    }

    state
        .store
        .update_tenants(|tenants| tenants.retain(|tenant| tenant.id != target.id))
        .map_err(|error| ApiError::internal(format!("failed to persist tenants: {error}")))?;
    info!(login = %target.login, id = target.id, "tenant deleted");
    Ok(())
}

/// Fields used to build filesystem paths must stay path-safe.
pub(crate) fn validate_path_component(value: &str, field: &str) -> Result<(), ApiError> {
    if value.is_empty() {
        return Err(ApiError::invalid_input(format!("{field} must not be empty")));
    }
    if !value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(ApiError::invalid_input(format!(
            "{field} may only contain letters, digits, '-' and '_'"
        )));
    }
    Ok(())
}

pub(crate) fn tenant_view(tenant: &TenantRecord) -> Value {
    json!({
        "id": tenant.id,
        "login": tenant.login,
        "max_bots": tenant.max_bots,
        "created_at": tenant.created_at,
        "expires_at": tenant.expires_at,
        "is_admin": tenant.is_admin,
        "contact": tenant.contact,
    })
}
