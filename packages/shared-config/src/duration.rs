//! Duration strings for configuration values

use std::time::Duration;

use crate::{ConfigError, ConfigResult};

/// Parse a duration such as `30s`, `15m`, `1h` or `7d`.
///
/// A bare number is read as seconds. `0s` (or `0`) yields a zero duration,
/// which callers use to mean "disabled".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    let num: u64 = num.parse().ok()?;

    let secs = match unit {
        "" | "s" => num,
        "m" => num.checked_mul(60)?,
        "h" => num.checked_mul(60 * 60)?,
        "d" => num.checked_mul(24 * 60 * 60)?,
        _ => return None,
    };

    Some(Duration::from_secs(secs))
}

/// Read a duration from the environment, using `default` when unset
pub fn parse_duration_env(name: &str, default: &str) -> ConfigResult<Duration> {
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    parse_duration(&raw).ok_or(ConfigError::InvalidDuration(name.to_string(), raw))
}
