//! Utility functions.
//!
//! Collection of helper functions used across the runtime.

use rand::Rng;
use sha2::{Digest, Sha256};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate an uppercase hex string of `len` characters.
pub fn gen_hex(len: usize) -> String {
    const HEX: &[u8] = b"0123456789ABCDEF";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
        .collect()
}

/// Stable short hash of a plugin location.
///
/// Used as the prefix of every registration id created for that location,
/// so a unit can be unloaded without remembering what it registered.
pub fn hash_location(location: &str) -> String {
    let digest = Sha256::digest(location.as_bytes());
    digest[..4].iter().map(|b| format!("{:02X}", b)).collect()
}

/// Format elapsed milliseconds as a compact human string (e.g. `1h 2m 3s`).
pub fn format_elapse(ms: i64) -> String {
    if ms < 1000 {
        return format!("{}ms", ms.max(0));
    }

    let secs = ms / 1000;
    let parts = [
        (secs / 86400, "d"),
        ((secs % 86400) / 3600, "h"),
        ((secs % 3600) / 60, "m"),
        (secs % 60, "s"),
    ];

    let text: Vec<String> = parts
        .iter()
        .filter(|(amount, _)| *amount > 0)
        .map(|(amount, unit)| format!("{}{}", amount, unit))
        .collect();

    text.join(" ")
}

/// Parse a duration string into seconds (e.g. "90", "30s", "1h", "7d", "1w").
///
/// A bare number is taken as seconds. `off` parses to zero.
pub fn parse_duration_secs(input: &str) -> Option<u32> {
    let input = input.trim().to_lowercase();
    if input.is_empty() {
        return None;
    }
    if input == "off" {
        return Some(0);
    }
    if let Ok(secs) = input.parse::<u32>() {
        return Some(secs);
    }

    let last = input.chars().last()?;
    let (digits, unit) = input.split_at(input.len() - last.len_utf8());
    let amount: u32 = digits.parse().ok()?;

    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        "w" => 604800,
        _ => return None,
    };

    amount.checked_mul(multiplier)
}

/// Shorten a string to `len` characters by keeping both ends around `mid`.
pub fn slice_middle(text: &str, len: usize, mid: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= len {
        return text.to_string();
    }
    let half = len.div_ceil(2);
    let start: String = chars[..half].iter().collect();
    let end: String = chars[chars.len() - half..].iter().collect();
    format!("{}{}{}", start, mid, end)
}

/// Collapse newlines and repeated whitespace into single spaces.
pub fn clean_name(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
