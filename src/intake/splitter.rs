//! Content extraction: strip the address phrase out of a report message.
//!
//! Reports are written as `"<...> en <address> <content>"`. The phrase to
//! remove is located by the longest message word that also occurs inside the
//! matched address (the *anchor*), prefixed with the connective `"en "`.
//!
//! The anchor comes from the lowercased message while the removal runs
//! against the original text, so `"En San Benito ..."` keeps its address
//! phrase: only an exact, case-sensitive `"en <anchor>"` is removed.

/// Connective preceding the address in a report.
pub const CONNECTIVE: &str = "en ";

/// Longest lowercased message word contained in the lowercased address.
///
/// Ties keep the first word encountered; no overlap yields `""`.
pub fn anchor_token(message: &str, address: &str) -> String {
    let address = address.to_lowercase();
    message
        .to_lowercase()
        .split_whitespace()
        .fold(String::new(), |longest, word| {
            if address.contains(word) && word.chars().count() > longest.chars().count() {
                word.to_string()
            } else {
                longest
            }
        })
}

/// The part of `message` that is not the address phrase.
pub fn extract_content(message: &str, address: &str) -> String {
    let pattern = format!("{CONNECTIVE}{}", anchor_token(message, address));
    message.replacen(&pattern, "", 1).trim().to_string()
}
