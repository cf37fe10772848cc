//! # Receipt Query
//!
//! Ask questions about your grocery receipts in plain language.
//!
//! Receipts are stored in SQLite. Every purchased item is also indexed in a
//! TF-IDF vector index. Each question is classified and its filters (dates,
//! store, item, amount) are extracted. It is then answered either exactly,
//! with a parameterized SQL template, or approximately, by cosine similarity
//! over the vector index. Exact answers with no rows fall back to the
//! vector index.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ receipts.json│──▶│    ingest    │──▶│    SQLite    │
//! └──────────────┘   └──────┬───────┘   └──────┬───────┘
//!                           ▼                  │
//!                    ┌──────────────┐          │
//!                    │ vector index │◀─rebuild─┘
//!                    └──────┬───────┘
//!                           ▼
//!      question ──▶ classify + extract ──▶ router ──▶ SQL | vector
//!                                            │
//!                      ┌─────────────────────┤
//!                      ▼                     ▼
//!                 ┌──────────┐         ┌──────────┐
//!                 │   CLI    │         │   HTTP   │
//!                 │   (rq)   │         │  server  │
//!                 └──────────┘         └──────────┘
//! ```
//!
//! The retrieval logic itself lives in the `receipt-query-core` crate; this
//! crate adds storage, persistence, configuration, and the outer surfaces.
//!
//! ## Quick Start
//!
//! ```bash
//! rq init                               # create database
//! rq ingest receipts.json               # import receipts
//! rq query "how much did I spend this week"
//! rq query "find chicken food" --json
//! rq similar 1                          # items like item 1
//! rq serve                              # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite record store |
//! | [`index_file`] | Index file load, recovery, and atomic persist |
//! | [`engine`] | Store + index + router wiring |
//! | [`ingest`] | Receipt import |
//! | [`query_cmd`] | Query command and text rendering |
//! | [`answer`] | Optional LLM-phrased answers |
//! | [`stats`] | Database and index statistics |
//! | [`suggest`] | Example questions |
//! | [`server`] | HTTP server |

pub mod answer;
pub mod config;
pub mod db;
pub mod engine;
pub mod index_file;
pub mod ingest;
pub mod migrate;
pub mod query_cmd;
pub mod server;
pub mod sqlite_store;
pub mod stats;
pub mod suggest;
