//! `rq suggest`: example questions to try.

/// Questions that exercise each intent and both answering paths.
pub const SUGGESTIONS: &[&str] = &[
    "What food did I buy yesterday?",
    "Give me total expenses for food on 20 June",
    "Where did I buy hamburger from last 7 days?",
    "Show me all items I bought this week",
    "How much did I spend on food last month?",
    "What stores did I shop at yesterday?",
    "List all pizza purchases from the last 30 days",
    "find chicken food",
    "search for apple fruit",
    "similar to burrito",
    "mexican cuisine",
    "dairy products",
];

pub fn run_suggest() {
    println!("Try asking:");
    for s in SUGGESTIONS {
        println!("  rq query \"{}\"", s);
    }
}
