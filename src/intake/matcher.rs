//! Address matching: find known departments mentioned by a free-text message.

use crate::store::AddressRecord;

/// Tokens this short or shorter are treated as noise (articles, prepositions).
const MIN_TOKEN_CHARS: usize = 2;

/// Lowercased whitespace tokens of `message` longer than two characters.
pub fn significant_tokens(message: &str) -> Vec<String> {
    message
        .to_lowercase()
        .split_whitespace()
        .filter(|word| word.chars().count() > MIN_TOKEN_CHARS)
        .map(str::to_string)
        .collect()
}

/// Every known address containing at least one significant token of
/// `message` as a substring, in the order the store returned them.
pub fn find_candidates(message: &str, known: &[AddressRecord]) -> Vec<AddressRecord> {
    let tokens = significant_tokens(message);
    if tokens.is_empty() {
        return Vec::new();
    }

    known
        .iter()
        .filter(|record| {
            let address = record.address.to_lowercase();
            tokens.iter().any(|token| address.contains(token.as_str()))
        })
        .cloned()
        .collect()
}

/// [`find_candidates`] truncated to at most `cap` entries.
pub fn find_candidates_capped(
    message: &str,
    known: &[AddressRecord],
    cap: usize,
) -> Vec<AddressRecord> {
    let mut candidates = find_candidates(message, known);
    if candidates.len() > cap {
        tracing::debug!(
            matched = candidates.len(),
            cap,
            "Candidate list truncated"
        );
        candidates.truncate(cap);
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(addresses: &[&str]) -> Vec<AddressRecord> {
        addresses.iter().map(|a| AddressRecord::new(*a)).collect()
    }

    fn addresses(found: &[AddressRecord]) -> Vec<&str> {
        found.iter().map(|r| r.address.as_str()).collect()
    }

    #[test]
    fn matches_on_shared_word() {
        let known = records(&["San Benito de Palermo 1584"]);
        let found = find_candidates("En San Benito hay una pérdida de gas", &known);
        assert_eq!(addresses(&found), vec!["San Benito de Palermo 1584"]);
    }

    #[test]
    fn short_words_are_ignored() {
        // "de" and "en" both occur inside the address but are noise.
        let known = records(&["San Benito de Palermo 1584"]);
        assert!(find_candidates("en de la", &known).is_empty());
    }

    #[test]
    fn no_overlap_returns_empty() {
        let known = records(&["San Benito de Palermo 1584", "Calle Falsa 123"]);
        assert!(find_candidates("hay humedad arriba", &known).is_empty());
    }

    #[test]
    fn empty_message_returns_empty() {
        let known = records(&["Calle Falsa 123"]);
        assert!(find_candidates("", &known).is_empty());
        assert!(find_candidates("   ", &known).is_empty());
    }

    #[test]
    fn matching_is_case_insensitive() {
        let known = records(&["CALLE FALSA 123"]);
        assert_eq!(find_candidates("problema en calle falsa", &known).len(), 1);
    }

    #[test]
    fn token_may_be_a_fragment_of_an_address_word() {
        // "ben" is a substring of "benito".
        let known = records(&["San Benito de Palermo 1584"]);
        assert_eq!(find_candidates("ben", &known).len(), 1);
    }

    #[test]
    fn preserves_store_order() {
        let known = records(&["Arenales 1584", "Zapiola 10", "Moreno 1584"]);
        let found = find_candidates("timbre roto en 1584", &known);
        assert_eq!(addresses(&found), vec!["Arenales 1584", "Moreno 1584"]);
    }

    #[test]
    fn token_length_counts_characters_not_bytes() {
        // "ñú" is two characters (four bytes) and must be filtered.
        let known = records(&["Ñúñez 20"]);
        assert!(find_candidates("ñú", &known).is_empty());
        assert_eq!(find_candidates("ñúñ", &known).len(), 1);
    }

    #[test]
    fn cap_truncates_keeping_order() {
        let known = records(&["Moreno 1", "Moreno 2", "Moreno 3"]);
        let found = find_candidates_capped("en moreno", &known, 2);
        assert_eq!(addresses(&found), vec!["Moreno 1", "Moreno 2"]);
    }

    #[test]
    fn cap_larger_than_matches_is_noop() {
        let known = records(&["Moreno 1"]);
        assert_eq!(find_candidates_capped("en moreno", &known, 10).len(), 1);
    }

    #[test]
    fn every_overlapping_address_is_included() {
        let known = records(&["Calle Falsa 123", "Falsa Escuadra 9", "Zapiola 10"]);
        let message = "Se rompió el ascensor en Falsa";
        let found = find_candidates(message, &known);
        for record in &known {
            let overlaps = significant_tokens(message)
                .iter()
                .any(|t| record.address.to_lowercase().contains(t.as_str()));
            assert_eq!(found.contains(record), overlaps, "{}", record.address);
        }
    }
}
