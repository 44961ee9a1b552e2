//! Jid helpers.

pub const USER_SERVER: &str = "s.whatsapp.net";
pub const GROUP_SERVER: &str = "g.us";
pub const STATUS_BROADCAST: &str = "status@broadcast";

/// Strip the device suffix from a jid.
///
/// `628123:12@s.whatsapp.net` becomes `628123@s.whatsapp.net`. Jids without
/// a device part are returned unchanged.
pub fn normalize(jid: &str) -> String {
    let jid = jid.trim();
    match jid.split_once('@') {
        Some((user, server)) => {
            let user = user.split_once(':').map_or(user, |(u, _)| u);
            format!("{}@{}", user, server)
        }
        None => jid.to_string(),
    }
}

/// Expand a bare phone number into a user jid.
pub fn from_number(input: &str) -> String {
    let input = input.trim();
    if input.contains('@') {
        return normalize(input);
    }
    let digits: String = input.chars().filter(char::is_ascii_digit).collect();
    format!("{}@{}", digits, USER_SERVER)
}

pub fn is_group(jid: &str) -> bool {
    jid.ends_with(&format!("@{}", GROUP_SERVER))
}

pub fn is_status(jid: &str) -> bool {
    jid == STATUS_BROADCAST
}
