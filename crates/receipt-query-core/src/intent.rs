//! Rule-based intent classification.
//!
//! Rules are tried in priority order; the first one that fires decides the
//! intent. Each rule has multi-word phrases, which score higher, and single
//! keywords, which score lower. Classification is a pure function of the
//! query text.

use serde::Serialize;

use crate::extract;
use crate::models::Intent;
use crate::tokenize;

/// Output of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Classification {
    pub intent: Intent,
    /// In `[0, 1]`.
    pub confidence: f32,
}

struct Rule {
    intent: Intent,
    phrases: &'static [&'static str],
    phrase_confidence: f32,
    keywords: &'static [&'static str],
    keyword_confidence: f32,
}

// "like" alone is too common ("I'd like") to count as a semantic cue.
const SEMANTIC: Rule = Rule {
    intent: Intent::SemanticSearch,
    phrases: &[
        "similar to",
        "something like",
        "things like",
        "items like",
        "related to",
        "search for",
        "look for",
        "looking for",
    ],
    phrase_confidence: 0.95,
    keywords: &[
        "find",
        "search",
        "similar",
        "related",
        "resembling",
        "comparable",
        "discover",
        "match",
        "matching",
    ],
    keyword_confidence: 0.85,
};

const SPENDING: Rule = Rule {
    intent: Intent::SpendingAnalysis,
    phrases: &["how much", "total spending", "total spent", "money on"],
    phrase_confidence: 0.9,
    keywords: &[
        "total",
        "spend",
        "spent",
        "spending",
        "cost",
        "costs",
        "expense",
        "expenses",
        "expenditure",
    ],
    keyword_confidence: 0.8,
};

const STORE: Rule = Rule {
    intent: Intent::StoreQuery,
    phrases: &[
        "where did",
        "which store",
        "which stores",
        "what store",
        "what stores",
        "shop at",
        "shopped at",
    ],
    phrase_confidence: 0.9,
    keywords: &[
        "where",
        "store",
        "stores",
        "shop",
        "shops",
        "shopped",
        "supermarket",
    ],
    keyword_confidence: 0.75,
};

const LIST: Rule = Rule {
    intent: Intent::ListItems,
    phrases: &[
        "what did i buy",
        "what did i get",
        "what have i bought",
        "show me",
        "list all",
    ],
    phrase_confidence: 0.9,
    keywords: &["what", "which", "show", "list", "display"],
    keyword_confidence: 0.7,
};

/// A store name after "at"/"from" with no other cue.
const STORE_NAME_CONFIDENCE: f32 = 0.6;
/// Fallback when the text has at least one salient word.
const ITEM_SEARCH_CONFIDENCE: f32 = 0.4;

/// Every word any rule keys on. The extractor never treats these as item
/// names.
pub(crate) fn is_cue_word(word: &str) -> bool {
    [SEMANTIC, SPENDING, STORE, LIST]
        .iter()
        .any(|rule| rule.keywords.contains(&word))
}

impl Rule {
    fn confidence(&self, padded: &str, words: &[String]) -> Option<f32> {
        if self
            .phrases
            .iter()
            .any(|p| padded.contains(&format!(" {p} ")))
        {
            return Some(self.phrase_confidence);
        }
        if words.iter().any(|w| self.keywords.contains(&w.as_str())) {
            return Some(self.keyword_confidence);
        }
        None
    }
}

/// Classify query text into an [`Intent`] with a confidence.
///
/// ```rust
/// use receipt_query_core::intent::classify;
/// use receipt_query_core::models::Intent;
///
/// let c = classify("find chicken food");
/// assert_eq!(c.intent, Intent::SemanticSearch);
/// ```
pub fn classify(text: &str) -> Classification {
    let words = tokenize::words(text);
    let padded = format!(" {} ", words.join(" "));

    for rule in [SEMANTIC, SPENDING, STORE] {
        if let Some(confidence) = rule.confidence(&padded, &words) {
            return Classification {
                intent: rule.intent,
                confidence,
            };
        }
    }

    if names_store_after_preposition(text) {
        return Classification {
            intent: Intent::StoreQuery,
            confidence: STORE_NAME_CONFIDENCE,
        };
    }

    if let Some(confidence) = LIST.confidence(&padded, &words) {
        return Classification {
            intent: LIST.intent,
            confidence,
        };
    }

    if words.iter().any(|w| extract::is_salient(w)) {
        return Classification {
            intent: Intent::ItemSearch,
            confidence: ITEM_SEARCH_CONFIDENCE,
        };
    }

    Classification {
        intent: Intent::Unknown,
        confidence: 0.0,
    }
}

/// True for "... at Costco" / "... from Trader Joe's" style text.
fn names_store_after_preposition(text: &str) -> bool {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.windows(2).any(|pair| {
        let prep = pair[0].to_lowercase();
        (prep == "at" || prep == "from") && extract::looks_like_store_token(pair[1])
    })
}
