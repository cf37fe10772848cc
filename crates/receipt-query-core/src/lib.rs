//! # Receipt Query Core
//!
//! Runtime-free logic for answering natural-language questions about
//! purchase records: the TF-IDF vector index, its binary codec, the intent
//! classifier, the parameter extractor, the SQL template generator, and the
//! query router that chooses between exact and semantic answers.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. The relational
//! store is reached through the [`store::RecordStore`] trait, implemented by
//! the application crate (SQLite) and by [`store::memory::InMemoryRecordStore`]
//! for tests.

pub mod codec;
pub mod error;
pub mod extract;
pub mod index;
pub mod intent;
pub mod models;
pub mod router;
pub mod shared;
pub mod sql;
pub mod store;
pub mod tokenize;
pub mod vocabulary;

pub use error::{Error, Result};
