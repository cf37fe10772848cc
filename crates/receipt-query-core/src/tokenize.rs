//! Text normalization shared by the vector index and the query parsers.
//!
//! Index terms are produced by [`terms`]: lower-cased, stripped of
//! punctuation other than `-`, split on whitespace and hyphens, with
//! single-character tokens, tokens longer than [`MAX_TERM_BYTES`], and
//! [`INDEX_STOP_WORDS`] removed. There is no stemming, so `egg` and `eggs`
//! are distinct terms.

/// Longest index term, in UTF-8 bytes. Longer tokens are not indexed.
pub const MAX_TERM_BYTES: usize = 255;

/// Words that never become index terms.
pub const INDEX_STOP_WORDS: &[&str] = &[
    "an", "and", "at", "by", "for", "from", "in", "of", "on", "or", "the", "to", "with",
];

/// Split text into lower-cased words, keeping letters, digits and `-`.
///
/// No tokens are dropped; this is the view the intent classifier and the
/// parameter extractor work on.
pub fn words(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c.is_whitespace() {
                c
            } else if c == '\'' {
                // "joe's" -> "joes"
                '\0'
            } else {
                ' '
            }
        })
        .filter(|&c| c != '\0')
        .collect();

    cleaned.split_whitespace().map(str::to_string).collect()
}

/// Normalize text into index terms.
///
/// ```rust
/// use receipt_query_core::tokenize::terms;
///
/// assert_eq!(terms("Kids-Meal w/ Fries"), vec!["kids", "meal", "fries"]);
/// assert_eq!(terms("The Milk & the Bread"), vec!["milk", "bread"]);
/// ```
pub fn terms(text: &str) -> Vec<String> {
    words(text)
        .iter()
        .flat_map(|w| w.split('-'))
        .filter(|t| t.chars().count() > 1 && t.len() <= MAX_TERM_BYTES)
        .filter(|t| !INDEX_STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}
