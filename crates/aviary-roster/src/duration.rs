//! Roster duration tokens: `<N>d` for days, `<N>h` for hours.

use chrono::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid duration token '{token}': use <N>d for days or <N>h for hours")]
pub struct InvalidDurationToken {
    pub token: String,
}

/// Parses a duration token. `N` must be a positive integer; any other shape
/// is rejected so callers can refuse the request before touching the
/// external system.
pub fn parse_duration_token(token: &str) -> Result<Duration, InvalidDurationToken> {
    let invalid = || InvalidDurationToken {
        token: token.to_string(),
    };
    let trimmed = token.trim();
    let (count_text, to_duration): (&str, fn(i64) -> Duration) =
        if let Some(count_text) = trimmed.strip_suffix('d') {
            (count_text, Duration::days)
        } else if let Some(count_text) = trimmed.strip_suffix('h') {
            (count_text, Duration::hours)
        } else {
            return Err(invalid());
        };
    let count = count_text.parse::<i64>().map_err(|_| invalid())?;
    if count <= 0 {
        return Err(invalid());
    }
    Ok(to_duration(count))
}
