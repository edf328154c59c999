//! Identifier validation.
//!
//! Character-set policy for the names that cross the wire: nicknames,
//! idents (usernames) and channel names.

/// Characters permitted in a nickname past the first character.
pub const NICK_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789`^-_[]{}|\\";

/// Characters permitted in a hostname or ident after filtering.
pub const HOST_CHARS: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789.-";

/// Validate a nickname against the character set and a length limit.
/// The first character may not be a digit or `-`.
pub fn valid_nick(nick: &str, max_len: usize) -> bool {
    if nick.is_empty() || nick.len() > max_len {
        return false;
    }
    let mut chars = nick.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() || c == '-' => return false,
        Some(c) if !NICK_CHARS.contains(c) => return false,
        Some(_) => {}
        None => return false,
    }
    chars.all(|c| NICK_CHARS.contains(c))
}

/// Filter an ident down to its permitted characters, truncated to `max_len`.
/// Returns `None` when nothing survives.
pub fn clean_ident(ident: &str, max_len: usize) -> Option<String> {
    let cleaned: String = ident
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .take(max_len)
        .collect();
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

/// Validate a channel name: `#`, `&` or `+` sigil, printable, no separators.
pub fn valid_channel_name(name: &str, max_len: usize) -> bool {
    if name.len() < 2 || name.len() > max_len {
        return false;
    }
    if !name.starts_with(['#', '&', '+']) {
        return false;
    }
    name.chars()
        .all(|c| !c.is_control() && c != ' ' && c != ',' && c != ':')
}
