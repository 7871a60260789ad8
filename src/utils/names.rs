//! Entity name grammar.

use std::sync::LazyLock;

use regex::Regex;

static WORD_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+$").expect("Invalid name regex"));

/// Normalize a proposed entity name.
///
/// The name must start with an ASCII letter. Surrounding spaces are dropped,
/// inner spaces become `_`, and what remains must consist of word characters
/// only. Returns `None` when the name is not acceptable.
///
/// ```
/// use brickworks::utils::names::valid_name;
///
/// assert_eq!(valid_name("my switch"), Some("my_switch".to_string()));
/// assert_eq!(valid_name("1switch"), None);
/// ```
pub fn valid_name(raw: &str) -> Option<String> {
    if !raw.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let name = raw.trim_matches(' ').replace(' ', "_");
    if WORD_CHARS.is_match(&name) {
        Some(name)
    } else {
        None
    }
}
