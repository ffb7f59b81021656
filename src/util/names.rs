//! Snapshot naming and operator identity

use chrono::{DateTime, Utc};

/// Timestamp layout embedded in snapshot names (second granularity)
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Label used when the operator does not supply one
pub const DEFAULT_LABEL: &str = "backup";

/// Label prefix reserved for snapshots taken automatically before a restore
pub const SAFETY_LABEL: &str = "pre_restore_safety";

/// Format a timestamp the way it appears in snapshot names
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Build a snapshot directory name: `<label>_<timestamp>`
pub fn snapshot_name(label: &str, at: DateTime<Utc>) -> String {
    format!("{}_{}", sanitize_label(label), format_timestamp(at))
}

/// Split a snapshot name back into `(label, timestamp)`.
///
/// Returns None for names that don't end in a parseable timestamp.
pub fn parse_snapshot_name(name: &str) -> Option<(String, DateTime<Utc>)> {
    // Timestamp is always the trailing `YYYYmmdd_HHMMSS` (15 chars)
    if name.len() < 17 || !name.is_char_boundary(name.len() - 15) {
        return None;
    }
    let (head, ts) = name.split_at(name.len() - 15);
    let label = head.strip_suffix('_')?;
    let naive = chrono::NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).ok()?;
    Some((label.to_string(), naive.and_utc()))
}

/// Sanitize a free-form label for use in a directory name
///
/// - Lowercase
/// - Replace spaces and separators with underscores
/// - Drop anything that isn't alphanumeric, `-` or `_`
pub fn sanitize_label(input: &str) -> String {
    let cleaned = input
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' | '.' => '_',
            c if c.is_alphanumeric() || c == '-' || c == '_' => c,
            _ => '_',
        })
        .collect::<String>()
        .trim_matches('_')
        .to_string();

    if cleaned.is_empty() {
        DEFAULT_LABEL.to_string()
    } else {
        cleaned
    }
}

/// Get the operator identity recorded in manifests
///
/// Priority:
/// 1. OS username (USER or USERNAME environment variable)
/// 2. git config user.name
/// 3. Fallback to "unknown"
pub fn operator_identity() -> String {
    for var in ["USER", "USERNAME"] {
        if let Ok(user) = std::env::var(var) {
            if !user.is_empty() {
                return user;
            }
        }
    }

    if let Ok(output) = std::process::Command::new("git")
        .args(["config", "user.name"])
        .output()
    {
        if output.status.success() {
            let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !name.is_empty() {
                return name;
            }
        }
    }

    "unknown".to_string()
}

/// Get the host identity recorded in manifests
pub fn host_identity() -> String {
    if let Ok(host) = std::env::var("HOSTNAME") {
        if !host.is_empty() {
            return host;
        }
    }

    if let Ok(contents) = std::fs::read_to_string("/etc/hostname") {
        let host = contents.trim();
        if !host.is_empty() {
            return host.to_string();
        }
    }

    if let Ok(output) = std::process::Command::new("hostname").output() {
        if output.status.success() {
            let host = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !host.is_empty() {
                return host;
            }
        }
    }

    "unknown-host".to_string()
}
