//! Header-based request authorization.

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

use aviary_core::{is_expired, now_utc};
use aviary_store::TenantRecord;

use crate::error::ApiError;
use crate::state::AppState;

pub const LOGIN_HEADER: &str = "x-aviary-login";
pub const KEY_HEADER: &str = "x-aviary-key";

pub fn password_digest(secret: &str) -> String {
    format!("{:x}", Sha256::digest(secret.as_bytes()))
}

/// Resolves the calling tenant from the credential headers.
///
/// Expired non-admin tenants are refused even with valid credentials.
pub(crate) fn authorize(state: &AppState, headers: &HeaderMap) -> Result<TenantRecord, ApiError> {
    let login = header_value(headers, LOGIN_HEADER).ok_or_else(ApiError::unauthorized)?;
    let key = header_value(headers, KEY_HEADER).ok_or_else(ApiError::unauthorized)?;
    let digest = password_digest(&key);

    let tenant = state
        .store
        .load_tenants()
        .into_iter()
        .find(|tenant| tenant.login == login && tenant.password_digest == digest)
        .ok_or_else(ApiError::unauthorized)?;
    if !tenant.is_admin && is_expired(tenant.expires_at, now_utc()) {
        return Err(ApiError::forbidden("tenant lease has expired"));
    }
    Ok(tenant)
}

pub(crate) fn require_admin(tenant: &TenantRecord) -> Result<(), ApiError> {
    if tenant.is_admin {
        Ok(())
    } else {
        Err(ApiError::forbidden("administrator access required"))
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
