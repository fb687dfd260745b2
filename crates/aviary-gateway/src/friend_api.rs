//! Compatibility surface: direct collaborator round-trips keyed by raw
//! account credentials, kept for callers of the pre-roster API. Replies
//! mirror the legacy wire shape (`status` + `message`) rather than the
//! structured error envelope.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use aviary_core::now_utc;
use aviary_roster::{LinkStatus, PlayerIdentity};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct FriendActionQuery {
    pub uid: Option<String>,
    pub password: Option<String>,
    pub target: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FriendInfoQuery {
    pub target: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FriendTokenQuery {
    pub uid: Option<String>,
    pub password: Option<String>,
}

enum FriendAction {
    Add,
    Remove,
}

pub(crate) async fn handle_friend_add(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FriendActionQuery>,
) -> Response {
    friend_action(&state, query, FriendAction::Add).await
}

pub(crate) async fn handle_friend_remove(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FriendActionQuery>,
) -> Response {
    friend_action(&state, query, FriendAction::Remove).await
}

async fn friend_action(state: &AppState, query: FriendActionQuery, action: FriendAction) -> Response {
    let (Some(uid), Some(password), Some(target)) = (query.uid, query.password, query.target)
    else {
        return legacy_error("missing parameters: uid, password and target are required");
    };

    let session_token = match state.linker.authenticate(&uid, &password).await {
        Ok(token) => token,
        Err(error) => return legacy_error(error.to_string()),
    };
    let reply = match action {
        FriendAction::Add => state.linker.establish_relationship(&session_token, &target).await,
        FriendAction::Remove => state.linker.dissolve_relationship(&session_token, &target).await,
    };
    let reply = match reply {
        Ok(reply) => reply,
        Err(error) => return legacy_error(error.to_string()),
    };
    let identity = match state.linker.resolve_identity(&target).await {
        Ok(identity) => identity,
        Err(_) => PlayerIdentity::unknown(),
    };

    let status = match reply.status {
        LinkStatus::Confirmed => "success",
        LinkStatus::NotFound | LinkStatus::Rejected => "error",
    };
    Json(json!({
        "status": status,
        "message": reply.message,
        "player_info": identity,
    }))
    .into_response()
}

pub(crate) async fn handle_friend_info(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FriendInfoQuery>,
) -> Response {
    let Some(target) = query.target else {
        return legacy_error("missing parameters: target is required");
    };
    match state.linker.resolve_identity(&target).await {
        Ok(identity) => Json(json!({
            "status": "success",
            "player_info": {
                "id": target,
                "name": identity.name,
                "region": identity.region,
                "level": identity.level,
            }
        }))
        .into_response(),
        Err(error) => legacy_error(error.to_string()),
    }
}

pub(crate) async fn handle_friend_token(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FriendTokenQuery>,
) -> Response {
    let (Some(uid), Some(password)) = (query.uid, query.password) else {
        return legacy_error("missing parameters: uid and password are required");
    };
    match state.linker.authenticate(&uid, &password).await {
        Ok(token) => Json(json!({
            "status": "success",
            "token": token,
            "message": "session token issued",
        }))
        .into_response(),
        Err(error) => legacy_error(error.to_string()),
    }
}

pub(crate) async fn handle_friend_test(State(_state): State<Arc<AppState>>) -> Response {
    Json(json!({
        "status": "success",
        "message": "friend service reachable",
        "timestamp": now_utc(),
    }))
    .into_response()
}

pub(crate) async fn handle_api_status(State(state): State<Arc<AppState>>) -> Response {
    Json(json!({
        "status": "success",
        "message": "aviary control plane is running",
        "store_health": state.store.health_report(),
        "timestamp": now_utc(),
    }))
    .into_response()
}

fn legacy_error(message: impl Into<String>) -> Response {
    Json(json!({ "status": "error", "message": message.into() })).into_response()
}
