//! HTTP control plane for Aviary.
//!
//! Composes the record store, quota enforcer, process supervisor, and
//! roster reconciler under request-scoped authorization. Every handler
//! resolves the caller's tenant, consults the store, invokes the relevant
//! component, persists the updated collection, and replies with a
//! structured outcome; nothing terminates a request unhandled.

mod auth;
mod bots_api;
mod error;
mod friend_api;
mod links_api;
mod players_api;
mod server;
mod state;
mod tenants_api;

pub use auth::{password_digest, KEY_HEADER, LOGIN_HEADER};
pub use server::{build_gateway_router, run_gateway_server};
pub use state::{AppState, GatewayConfig};
