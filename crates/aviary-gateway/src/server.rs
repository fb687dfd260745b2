//! Router wiring and server bootstrap.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{delete, get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::bots_api::{
    handle_bot_create, handle_bot_delete, handle_bot_detail, handle_bot_list, handle_bot_restart,
    handle_bot_start, handle_bot_stop,
};
use crate::friend_api::{
    handle_api_status, handle_friend_add, handle_friend_info, handle_friend_remove,
    handle_friend_test, handle_friend_token,
};
use crate::links_api::{handle_link_create, handle_link_delete, handle_link_list};
use crate::players_api::{
    handle_bulk_add, handle_bulk_remove, handle_player_add, handle_player_info,
    handle_player_remove, handle_player_status,
};
use crate::state::AppState;
use crate::tenants_api::{handle_tenant_create, handle_tenant_delete, handle_tenant_list};

pub fn build_gateway_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/status", get(handle_api_status))
        .route("/api/tenants", get(handle_tenant_list).post(handle_tenant_create))
        .route("/api/tenants/{id}", delete(handle_tenant_delete))
        .route("/api/bots", get(handle_bot_list).post(handle_bot_create))
        .route("/api/bots/{id}", get(handle_bot_detail).delete(handle_bot_delete))
        .route("/api/bots/{id}/start", post(handle_bot_start))
        .route("/api/bots/{id}/stop", post(handle_bot_stop))
        .route("/api/bots/{id}/restart", post(handle_bot_restart))
        .route("/api/bots/{id}/players", post(handle_player_add))
        .route("/api/bots/{id}/players/bulk-add", post(handle_bulk_add))
        .route("/api/bots/{id}/players/bulk-remove", post(handle_bulk_remove))
        .route("/api/bots/{id}/players/{uid}", get(handle_player_status))
        .route(
            "/api/players/{id}",
            get(handle_player_info).delete(handle_player_remove),
        )
        .route("/api/links", get(handle_link_list).post(handle_link_create))
        .route("/api/links/{id}", delete(handle_link_delete))
        .route("/friend/add", get(handle_friend_add))
        .route("/friend/remove", get(handle_friend_remove))
        .route("/friend/info", get(handle_friend_info))
        .route("/friend/token", get(handle_friend_token))
        .route("/friend/test", get(handle_friend_test))
        .with_state(state)
}

/// Bootstraps the administrator tenant, binds the listener, and serves
/// until ctrl-c.
pub async fn run_gateway_server(state: Arc<AppState>) -> Result<()> {
    std::fs::create_dir_all(&state.config.state_dir)
        .with_context(|| format!("failed to create {}", state.config.state_dir.display()))?;
    let admin = state.bootstrap_admin()?;
    info!(admin_login = %admin.login, "administrator tenant ready");

    let listener = TcpListener::bind(state.config.bind)
        .await
        .with_context(|| format!("failed to bind gateway on {}", state.config.bind))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound gateway address")?;
    info!(
        addr = %local_addr,
        state_dir = %state.config.state_dir.display(),
        "aviary gateway listening"
    );

    let app = build_gateway_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("gateway server exited unexpectedly")
}
