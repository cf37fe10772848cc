//! Parameter extraction from query text.
//!
//! [`extract`] pulls an amount predicate, a date range, a store name, and an
//! item name out of free text. Each field is independent and optional;
//! anything that does not parse cleanly is left absent instead of failing.
//!
//! Amount and date spans are matched on the lower-cased text and blanked
//! out, the store is read from the original text (capitalization matters),
//! and whatever salient words remain become the item name.

use std::ops::Range;
use std::sync::LazyLock;

use chrono::{Datelike, Days, Months, NaiveDate};
use regex::{Captures, Regex};

use crate::intent;
use crate::models::{AmountPredicate, Comparison, DateRange, Parameters};
use crate::tokenize;

const MONTH_NAMES: &str = "january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec";

const CALENDAR_WORDS: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december", "jan", "feb", "mar", "apr", "jun", "jul", "aug", "sep",
    "sept", "oct", "nov", "dec", "monday", "tuesday", "wednesday", "thursday", "friday",
    "saturday", "sunday",
];

const DATE_WORDS: &[&str] = &[
    "today", "yesterday", "day", "days", "week", "weeks", "weekend", "month", "months", "year",
    "years", "last", "past", "this", "ago", "recent", "recently", "next",
];

const QUERY_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "all", "am", "an", "and", "any", "are", "as", "at", "be", "below",
    "between", "by", "can", "could", "did", "do", "does", "during", "each", "ever", "every",
    "for", "from", "get", "give", "got", "had", "has", "have", "how", "i", "in", "into", "is",
    "it", "its", "just", "least", "less", "like", "look", "looking", "many", "me", "more", "most",
    "much", "my", "no", "not", "of", "on", "only", "or", "our", "over", "please", "so", "some",
    "tell", "than", "that", "the", "them", "there", "these", "those", "to", "under", "up", "us",
    "very", "want", "was", "we", "were", "when", "who", "will", "would", "you", "your",
];

const FILLER_WORDS: &[&str] = &[
    "food", "foods", "item", "items", "thing", "things", "stuff", "product", "products",
    "purchase", "purchases", "purchased", "buy", "buying", "bought", "receipt", "receipts",
    "grocery", "groceries", "money", "dollar", "dollars", "order", "orders", "ordered", "paid",
    "pay",
];

const STORE_NOUNS: &[&str] = &["store", "supermarket", "market"];

static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(no\s+more\s+than|more\s+than|greater\s+than|less\s+than|cheaper\s+than|at\s+least|at\s+most|over|above|under|below)\s+\$?(\d+(?:\.\d{1,2})?)\b",
    )
    .expect("valid regex")
});

static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    let atom = format!(
        r"(?:\d{{4}}-\d{{1,2}}-\d{{1,2}}|\d{{1,2}}/\d{{1,2}}/\d{{4}}|\d{{1,2}}(?:st|nd|rd|th)?\s+(?:of\s+)?(?:{m})(?:,?\s+\d{{4}})?|(?:{m})\s+\d{{1,2}}(?:st|nd|rd|th)?\b(?:,?\s+\d{{4}})?|(?:{m})\s+\d{{4}}|(?:{m})|\d{{4}})",
        m = MONTH_NAMES
    );
    Regex::new(&format!(
        r"\b(?:between|from)\s+({atom})\s+(?:and|to)\s+({atom})\b"
    ))
    .expect("valid regex")
});

static ISO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").expect("valid regex"));

static US_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("valid regex"));

static DAY_MONTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?({MONTH_NAMES})\b(?:,?\s+(\d{{4}})\b)?"
    ))
    .expect("valid regex")
});

static MONTH_DAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b({MONTH_NAMES})\s+(\d{{1,2}})(?:st|nd|rd|th)?\b(?:,?\s+(\d{{4}})\b)?"
    ))
    .expect("valid regex")
});

static MONTH_YEAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\b({MONTH_NAMES})\s+(\d{{4}})\b")).expect("valid regex")
});

static MONTH_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^({MONTH_NAMES})$")).expect("valid regex"));

static YEAR_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})$").expect("valid regex"));

static RELATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:last|past)\s+(\d{1,4})\s+(days?|weeks?|months?)\b").expect("valid regex")
});

static PHRASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(today|yesterday|this\s+week|(?:last|past)\s+week|this\s+month|last\s+month|this\s+year|last\s+year)\b",
    )
    .expect("valid regex")
});

static IN_YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:in|from|during)\s+(\d{4})\b").expect("valid regex"));

static IN_MONTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\b(?:in|during)\s+({MONTH_NAMES})\b")).expect("valid regex")
});

type DateParser = fn(&Captures<'_>, NaiveDate) -> Option<DateRange>;

/// Extract structured parameters from `text`, resolving relative dates
/// against `now`.
///
/// ```rust
/// use chrono::NaiveDate;
/// use receipt_query_core::extract::extract;
///
/// let now = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
/// let params = extract("what did I buy in 2018", now);
/// let range = params.date_range.unwrap();
/// assert_eq!(range.start, NaiveDate::from_ymd_opt(2018, 1, 1).unwrap());
/// assert_eq!(range.end, NaiveDate::from_ymd_opt(2018, 12, 31).unwrap());
/// assert_eq!(params.item_name, None);
/// ```
pub fn extract(text: &str, now: NaiveDate) -> Parameters {
    let mut lower = text.to_lowercase();

    let amount = find_amount(&lower).map(|(predicate, span)| {
        blank(&mut lower, span);
        predicate
    });

    let date_range = find_date_range(&lower, now).map(|(range, span)| {
        blank(&mut lower, span);
        range
    });

    let store = find_store(text);
    let store_words: Vec<String> = store.as_deref().map(tokenize::words).unwrap_or_default();

    let item_words: Vec<String> = tokenize::words(&lower)
        .into_iter()
        .filter(|w| !store_words.contains(w) && is_salient(w))
        .collect();
    let item_name = (!item_words.is_empty()).then(|| item_words.join(" "));

    Parameters {
        date_range,
        store,
        item_name,
        amount,
    }
}

/// A word that could name what was bought.
pub(crate) fn is_salient(word: &str) -> bool {
    word.chars().count() > 1
        && !word.chars().all(|c| c.is_ascii_digit() || c == '-')
        && !QUERY_STOP_WORDS.contains(&word)
        && !FILLER_WORDS.contains(&word)
        && !DATE_WORDS.contains(&word)
        && !is_calendar_word(word)
        && !intent::is_cue_word(word)
}

pub(crate) fn is_calendar_word(word: &str) -> bool {
    CALENDAR_WORDS.contains(&word)
}

/// A capitalized token that can be part of a store name.
pub(crate) fn looks_like_store_token(token: &str) -> bool {
    let word = trim_token(token);
    let Some(first) = word.chars().next() else {
        return false;
    };
    if !first.is_uppercase() {
        return false;
    }
    let lower = word.to_lowercase();
    lower != "i"
        && !is_calendar_word(&lower)
        && !DATE_WORDS.contains(&lower.as_str())
        && !QUERY_STOP_WORDS.contains(&lower.as_str())
        && !intent::is_cue_word(&lower)
}

fn trim_token(token: &str) -> &str {
    token.trim_matches(|c: char| !c.is_alphanumeric())
}

fn blank(text: &mut String, span: Range<usize>) {
    let spaces = " ".repeat(span.len());
    text.replace_range(span, &spaces);
}

fn find_amount(text: &str) -> Option<(AmountPredicate, Range<usize>)> {
    let caps = AMOUNT_RE.captures(text)?;
    let keyword = caps[1].split_whitespace().collect::<Vec<_>>().join(" ");
    let op = match keyword.as_str() {
        "over" | "above" | "more than" | "greater than" => Comparison::GreaterThan,
        "under" | "below" | "less than" | "cheaper than" => Comparison::LessThan,
        "at least" => Comparison::AtLeast,
        "at most" | "no more than" => Comparison::AtMost,
        _ => return None,
    };
    let value: f64 = caps[2].parse().ok()?;
    let span = caps.get(0)?.range();
    Some((AmountPredicate { op, value }, span))
}

fn find_date_range(text: &str, now: NaiveDate) -> Option<(DateRange, Range<usize>)> {
    if let Some(caps) = RANGE_RE.captures(text) {
        if let (Some(a), Some(b)) = (parse_atom(&caps[1], now), parse_atom(&caps[2], now)) {
            let range = DateRange::new(a.start.min(b.start), a.end.max(b.end));
            return Some((range, caps.get(0)?.range()));
        }
    }

    let rules: [(&Regex, DateParser); 9] = [
        (&*ISO_RE, parse_iso),
        (&*US_RE, parse_us),
        (&*DAY_MONTH_RE, parse_day_month),
        (&*MONTH_DAY_RE, parse_month_day),
        (&*MONTH_YEAR_RE, parse_month_year),
        (&*RELATIVE_RE, parse_relative),
        (&*PHRASE_RE, parse_phrase),
        (&*IN_YEAR_RE, parse_year),
        (&*IN_MONTH_RE, parse_month),
    ];
    for (re, parse) in rules {
        if let Some(caps) = re.captures(text) {
            if let Some(range) = parse(&caps, now) {
                return Some((range, caps.get(0)?.range()));
            }
        }
    }
    None
}

/// Parse one endpoint of a "between X and Y" range.
fn parse_atom(text: &str, now: NaiveDate) -> Option<DateRange> {
    let text = text.trim();
    let rules: [(&Regex, DateParser); 7] = [
        (&*ISO_RE, parse_iso),
        (&*US_RE, parse_us),
        (&*DAY_MONTH_RE, parse_day_month),
        (&*MONTH_DAY_RE, parse_month_day),
        (&*MONTH_YEAR_RE, parse_month_year),
        (&*MONTH_ONLY_RE, parse_month),
        (&*YEAR_ONLY_RE, parse_year),
    ];
    rules.into_iter().find_map(|(re, parse)| {
        let caps = re.captures(text)?;
        let whole = caps.get(0)?;
        if whole.start() != 0 || whole.end() != text.len() {
            return None;
        }
        parse(&caps, now)
    })
}

fn parse_iso(caps: &Captures<'_>, _now: NaiveDate) -> Option<DateRange> {
    let date = NaiveDate::from_ymd_opt(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    )?;
    Some(DateRange::day(date))
}

fn parse_us(caps: &Captures<'_>, _now: NaiveDate) -> Option<DateRange> {
    let date = NaiveDate::from_ymd_opt(
        caps[3].parse().ok()?,
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
    )?;
    Some(DateRange::day(date))
}

fn parse_day_month(caps: &Captures<'_>, now: NaiveDate) -> Option<DateRange> {
    let day: u32 = caps[1].parse().ok()?;
    let month = month_number(&caps[2])?;
    let year = caps.get(3).and_then(|m| m.as_str().parse().ok());
    day_in_year(year, month, day, now)
}

fn parse_month_day(caps: &Captures<'_>, now: NaiveDate) -> Option<DateRange> {
    let month = month_number(&caps[1])?;
    let day: u32 = caps[2].parse().ok()?;
    let year = caps.get(3).and_then(|m| m.as_str().parse().ok());
    day_in_year(year, month, day, now)
}

fn parse_month_year(caps: &Captures<'_>, _now: NaiveDate) -> Option<DateRange> {
    whole_month(caps[2].parse().ok()?, month_number(&caps[1])?)
}

/// A bare month means its most recent occurrence.
fn parse_month(caps: &Captures<'_>, now: NaiveDate) -> Option<DateRange> {
    let month = month_number(&caps[1])?;
    let year = if month > now.month() {
        now.year() - 1
    } else {
        now.year()
    };
    whole_month(year, month)
}

fn parse_year(caps: &Captures<'_>, _now: NaiveDate) -> Option<DateRange> {
    whole_year(caps[1].parse().ok()?)
}

fn parse_relative(caps: &Captures<'_>, now: NaiveDate) -> Option<DateRange> {
    let n: u32 = caps[1].parse().ok()?;
    let start = match &caps[2] {
        "day" | "days" => now.checked_sub_days(Days::new(u64::from(n)))?,
        "week" | "weeks" => now.checked_sub_days(Days::new(u64::from(n) * 7))?,
        _ => now.checked_sub_months(Months::new(n))?,
    };
    Some(DateRange::new(start, now))
}

fn parse_phrase(caps: &Captures<'_>, now: NaiveDate) -> Option<DateRange> {
    let phrase = caps[1].split_whitespace().collect::<Vec<_>>().join(" ");
    match phrase.as_str() {
        "today" => Some(DateRange::day(now)),
        "yesterday" => Some(DateRange::day(now.pred_opt()?)),
        // Seven days ending today.
        "this week" => Some(DateRange::new(now.checked_sub_days(Days::new(6))?, now)),
        "last week" | "past week" => {
            Some(DateRange::new(now.checked_sub_days(Days::new(7))?, now))
        }
        "this month" => Some(DateRange::new(now.with_day(1)?, now)),
        "last month" => {
            let prev = now.with_day(1)?.checked_sub_months(Months::new(1))?;
            whole_month(prev.year(), prev.month())
        }
        "this year" => Some(DateRange::new(
            NaiveDate::from_ymd_opt(now.year(), 1, 1)?,
            now,
        )),
        "last year" => whole_year(now.year() - 1),
        _ => None,
    }
}

fn month_number(name: &str) -> Option<u32> {
    let month = match name.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// A single day; without an explicit year, the most recent one not after `now`.
fn day_in_year(year: Option<i32>, month: u32, day: u32, now: NaiveDate) -> Option<DateRange> {
    let date = match year {
        Some(year) => NaiveDate::from_ymd_opt(year, month, day)?,
        None => {
            let this_year = NaiveDate::from_ymd_opt(now.year(), month, day);
            match this_year {
                Some(date) if date <= now => date,
                _ => NaiveDate::from_ymd_opt(now.year() - 1, month, day)?,
            }
        }
    };
    Some(DateRange::day(date))
}

fn whole_month(year: i32, month: u32) -> Option<DateRange> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = start.checked_add_months(Months::new(1))?.pred_opt()?;
    Some(DateRange::new(start, end))
}

fn whole_year(year: i32) -> Option<DateRange> {
    Some(DateRange::new(
        NaiveDate::from_ymd_opt(year, 1, 1)?,
        NaiveDate::from_ymd_opt(year, 12, 31)?,
    ))
}

fn find_store(text: &str) -> Option<String> {
    let tokens: Vec<&str> = text.split_whitespace().collect();

    for (i, token) in tokens.iter().enumerate() {
        let prep = trim_token(token).to_lowercase();
        if prep == "at" || prep == "from" {
            if let Some(name) = store_after(&tokens[i + 1..]) {
                return Some(name);
            }
        }
    }

    for (i, token) in tokens.iter().enumerate() {
        let noun = trim_token(token).to_lowercase();
        if STORE_NOUNS.contains(&noun.as_str()) {
            if let Some(name) = store_before(&tokens[..i]) {
                return Some(name);
            }
        }
    }
    None
}

/// "at Trader Joe's, ..." → "Trader Joe's". Punctuation ends the name.
fn store_after(tokens: &[&str]) -> Option<String> {
    let mut parts = Vec::new();
    for token in tokens {
        if !looks_like_store_token(token) {
            break;
        }
        let word = trim_token(token);
        parts.push(word);
        if word.len() != token.len() {
            break;
        }
    }
    (!parts.is_empty()).then(|| parts.join(" "))
}

/// "the Whole Foods store" → "Whole Foods".
fn store_before(tokens: &[&str]) -> Option<String> {
    let mut parts = Vec::new();
    for token in tokens.iter().rev() {
        if !looks_like_store_token(token) || trim_token(token).len() != token.len() {
            break;
        }
        parts.push(*token);
    }
    parts.reverse();
    (!parts.is_empty()).then(|| parts.join(" "))
}
