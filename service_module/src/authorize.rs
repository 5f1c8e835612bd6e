use regex::Regex;
use std::collections::HashSet;

/// Pull the bare address out of a `From` header value, which arrives either
/// as `Display Name <addr>` or as a bare `addr`.
pub fn sender_address(from: &str) -> Option<String> {
    let pattern = Regex::new(r"[\w.+-]+@[\w.-]+\.\w+").unwrap();
    pattern
        .find(from)
        .map(|m| m.as_str().to_ascii_lowercase())
}

/// Membership test against the allow-list of permitted senders.
pub fn is_authorized(authorized_senders: &HashSet<String>, from: &str) -> bool {
    match sender_address(from) {
        Some(address) => authorized_senders.contains(&address),
        None => false,
    }
}
