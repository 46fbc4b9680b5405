//! Mention extraction from rendered event text.
//!
//! Purely lexical, no I/O: the scanner returns candidate username tokens in
//! document order, duplicates included. Resolution against the user directory
//! (and dropping of unknown names) happens in the fan-out engine.

use std::sync::LazyLock;

use regex::Regex;

/// An `@` not preceded by a username character, followed by the username.
static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^A-Za-z0-9_.-])@([A-Za-z0-9_.-]+)").unwrap());

/// Scan rendered text for `@username` tokens.
///
/// A mention starts at an `@` that is not preceded by a username character
/// (so `user@example.com` is not a mention) and runs over `[A-Za-z0-9_.-]`,
/// with trailing `.` / `-` punctuation not counted as part of the name.
pub fn extract_mentions(rendered: &str) -> Vec<String> {
    MENTION
        .captures_iter(rendered)
        .filter_map(|captures| {
            let name = captures[1].trim_end_matches(['.', '-']);
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}
