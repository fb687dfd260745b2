use chrono::{DateTime, Duration, Utc};

/// Returns the current UTC wall-clock time.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Computes the expiry of a lease of `days` whole days starting at `from`.
pub fn lease_expiry(from: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    from + Duration::days(days)
}

/// Returns true when `expires_at` is no longer in the future.
pub fn is_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at <= now
}
