//! Roster endpoints: single and bulk add/remove, membership checks, and
//! identity lookups.

use std::sync::Arc;

use axum::extract::{Path as AxumPath, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::auth::authorize;
use crate::bots_api::find_authorized_bot;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct AddPlayerRequest {
    pub player_uid: String,
    pub duration: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BulkAddRequest {
    pub players: Vec<String>,
    pub duration: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BulkRemoveRequest {
    pub player_ids: Vec<u64>,
}

pub(crate) async fn handle_player_add(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(bot_id): AxumPath<u64>,
    Json(request): Json<AddPlayerRequest>,
) -> Response {
    let tenant = match authorize(&state, &headers) {
        Ok(tenant) => tenant,
        Err(error) => return error.into_response(),
    };
    let bot = match find_authorized_bot(&state, &tenant, bot_id) {
        Ok(bot) => bot,
        Err(error) => return error.into_response(),
    };

    let outcome = match state
        .reconciler
        .add(&bot, &request.player_uid, &request.duration)
        .await
    {
        Ok(outcome) => outcome,
        Err(invalid) => return ApiError::invalid_input(invalid.to_string()).into_response(),
    };
    if outcome.ok {
        Json(json!({
            "ok": true,
            "message": outcome.message,
            "player": outcome.player,
            "player_info": outcome.identity,
        }))
        .into_response()
    } else {
        ApiError::collaborator(outcome.message)
            .with_detail(json!({ "player_info": outcome.identity }))
            .into_response()
    }
}

pub(crate) async fn handle_player_remove(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(player_id): AxumPath<u64>,
) -> Response {
    let tenant = match authorize(&state, &headers) {
        Ok(tenant) => tenant,
        Err(error) => return error.into_response(),
    };
    let Some(player) = state
        .store
        .load_players()
        .into_iter()
        .find(|player| player.id == player_id)
    else {
        return ApiError::not_found(format!("roster entry {player_id} not found")).into_response();
    };
    let bot = match find_authorized_bot(&state, &tenant, player.bot_id) {
        Ok(bot) => bot,
        Err(error) => return error.into_response(),
    };

    let outcome = state.reconciler.remove(&bot, &player).await;
    if outcome.ok {
        Json(json!({ "ok": true, "message": outcome.message })).into_response()
    } else {
        ApiError::collaborator(outcome.message).into_response()
    }
}

pub(crate) async fn handle_bulk_add(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(bot_id): AxumPath<u64>,
    Json(request): Json<BulkAddRequest>,
) -> Response {
    let tenant = match authorize(&state, &headers) {
        Ok(tenant) => tenant,
        Err(error) => return error.into_response(),
    };
    let bot = match find_authorized_bot(&state, &tenant, bot_id) {
        Ok(bot) => bot,
        Err(error) => return error.into_response(),
    };

    let report = match state
        .reconciler
        .add_many(&bot, &request.players, &request.duration)
        .await
    {
        Ok(report) => report,
        Err(invalid) => return ApiError::invalid_input(invalid.to_string()).into_response(),
    };
    Json(json!({
        "ok": true,
        "message": format!(
            "{} added, {} failed",
            report.completed.len(),
            report.failed.len()
        ),
        "added": report.completed,
        "failed": report.failed,
    }))
    .into_response()
}

pub(crate) async fn handle_bulk_remove(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(bot_id): AxumPath<u64>,
    Json(request): Json<BulkRemoveRequest>,
) -> Response {
    let tenant = match authorize(&state, &headers) {
        Ok(tenant) => tenant,
        Err(error) => return error.into_response(),
    };
    let bot = match find_authorized_bot(&state, &tenant, bot_id) {
        Ok(bot) => bot,
        Err(error) => return error.into_response(),
    };

    let report = state.reconciler.remove_many(&bot, &request.player_ids).await;
    Json(json!({
        "ok": true,
        "message": format!(
            "{} removed, {} failed",
            report.completed.len(),
            report.failed.len()
        ),
        "removed": report.completed,
        "failed": report.failed,
    }))
    .into_response()
}

pub(crate) async fn handle_player_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath((bot_id, player_uid)): AxumPath<(u64, String)>,
) -> Response {
    let tenant = match authorize(&state, &headers) {
        Ok(tenant) => tenant,
        Err(error) => return error.into_response(),
    };
    let bot = match find_authorized_bot(&state, &tenant, bot_id) {
        Ok(bot) => bot,
        Err(error) => return error.into_response(),
    };

    let entry = state
        .store
        .load_players()
        .into_iter()
        .find(|player| player.bot_id == bot.id && player.uid == player_uid);
    Json(json!({
        "ok": true,
        "is_added": entry.is_some(),
        "player": entry,
    }))
    .into_response()
}

pub(crate) async fn handle_player_info(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(player_uid): AxumPath<String>,
) -> Response {
    if let Err(error) = authorize(&state, &headers) {
        return error.into_response();
    }
    match state.linker.resolve_identity(&player_uid).await {
        Ok(identity) => Json(json!({
            "ok": true,
            "uid": player_uid,
            "name": identity.name,
            "region": identity.region,
            "level": identity.level,
        }))
        .into_response(),
        Err(error) => ApiError::collaborator(error.to_string()).into_response(),
    }
}
