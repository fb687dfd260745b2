//! Reference-link endpoints. Admins curate, every tenant reads.

use std::sync::Arc;

use axum::extract::{Path as AxumPath, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use aviary_core::now_utc;
use aviary_store::{next_record_id, LinkRecord};

use crate::auth::{authorize, require_admin};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct CreateLinkRequest {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub icon: Option<String>,
}

pub(crate) async fn handle_link_list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    if let Err(error) = authorize(&state, &headers) {
        return error.into_response();
    }
    Json(json!({ "ok": true, "links": state.store.load_links() })).into_response()
}

pub(crate) async fn handle_link_create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateLinkRequest>,
) -> Response {
    let actor = match authorize(&state, &headers) {
        Ok(tenant) => tenant,
        Err(error) => return error.into_response(),
    };
    if let Err(error) = require_admin(&actor) {
        return error.into_response();
    }
    if request.name.is_empty() || request.url.is_empty() {
        return ApiError::invalid_input("name and url are required").into_response();
    }

    let created = state.store.update_links(|links| {
        let record = LinkRecord {
            id: next_record_id(links.iter().map(|link| link.id)),
            name: request.name.clone(),
            url: request.url.clone(),
            icon: request
                .icon
                .clone()
                .unwrap_or_else(|| "fas fa-link".to_string()),
            created_at: now_utc(),
        };
        links.push(record.clone());
        record
    });
    match created {
        Ok(link) => Json(json!({ "ok": true, "link": link })).into_response(),
        Err(error) => {
            ApiError::internal(format!("failed to persist links: {error}")).into_response()
        }
    }
}

pub(crate) async fn handle_link_delete(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(link_id): AxumPath<u64>,
) -> Response {
    let actor = match authorize(&state, &headers) {
        Ok(tenant) => tenant,
        Err(error) => return error.into_response(),
    };
    if let Err(error) = require_admin(&actor) {
        return error.into_response();
    }
    let removed = state.store.update_links(|links| {
        let before = links.len();
        links.retain(|link| link.id != link_id);
        links.len() < before
    });
    match removed {
        Ok(true) => Json(json!({ "ok": true, "message": "link deleted" })).into_response(),
        Ok(false) => ApiError::not_found(format!("link {link_id} not found")).into_response(),
        Err(error) => {
            ApiError::internal(format!("failed to persist links: {error}")).into_response()
        }
    }
}
