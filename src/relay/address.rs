use std::sync::OnceLock;

use regex::Regex;

fn display_name_address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^.*\S\s+<([^<>]+)>$").expect("compile display-name address regex")
    })
}

/// Reduces a `To` header value to the address used as the group key.
///
/// `Name <addr>` (display name, whitespace, bracketed address) yields `addr`; any other
/// shape is returned verbatim.
pub fn normalize_recipient(header: &str) -> &str {
    display_name_address_pattern()
        .captures(header)
        .and_then(|captures| captures.get(1))
        .map(|address| address.as_str().trim())
        .unwrap_or(header)
}

/// Group display name: the local part, first letter upper-cased and the rest lower-cased.
pub fn group_display_name(address: &str) -> String {
    let local_part = address.split('@').next().unwrap_or_default();
    let mut chars = local_part.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
