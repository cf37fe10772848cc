//! Query routing: the single entry point for answering a question.
//!
//! # Decision table
//!
//! | Intent | Condition | Path |
//! |--------|-----------|------|
//! | `semantic_search` | always | vector |
//! | any | confidence below threshold and no parameters | vector |
//! | `unknown` | has parameters | relational (`list_items` template) |
//! | `spending_analysis` | otherwise | relational, no fallback |
//! | `item_search`, `store_query`, `list_items` | otherwise | relational, vector fallback on zero rows |
//!
//! The vector path searches for the extracted item name when there is one,
//! else for the raw query text. Vector hits are joined to item attributes
//! through the record store; ids the store no longer knows are dropped.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use crate::error::{Error, Result};
use crate::extract::extract;
use crate::index::SearchHit;
use crate::intent::classify;
use crate::models::{Intent, Parameters, QueryResponse, QueryResult, ResultSource};
use crate::shared::SharedIndex;
use crate::sql;
use crate::store::RecordStore;

/// Routing and retrieval knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct RouterParams {
    /// Maximum vector hits.
    pub top_k: usize,
    /// Minimum cosine similarity for a vector hit.
    pub min_score: f32,
    /// Below this, a query with no parameters goes to the vector path.
    pub confidence_threshold: f32,
    /// Maximum relational item rows.
    pub relational_limit: usize,
}

impl Default for RouterParams {
    fn default() -> Self {
        Self {
            top_k: 10,
            min_score: 0.1,
            confidence_threshold: 0.5,
            relational_limit: 200,
        }
    }
}

/// Where a query goes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Vector,
    /// Relational, with the template of the given intent.
    Relational { template: Intent, fallback: bool },
}

/// Pick the route for a classified query.
pub fn route(
    intent: Intent,
    confidence: f32,
    parameters: &Parameters,
    confidence_threshold: f32,
) -> Route {
    match intent {
        Intent::SemanticSearch => Route::Vector,
        _ if confidence < confidence_threshold && parameters.is_empty() => Route::Vector,
        Intent::Unknown => Route::Relational {
            template: Intent::ListItems,
            fallback: true,
        },
        Intent::SpendingAnalysis => Route::Relational {
            template: Intent::SpendingAnalysis,
            fallback: false,
        },
        Intent::ItemSearch | Intent::StoreQuery | Intent::ListItems => Route::Relational {
            template: intent,
            fallback: true,
        },
    }
}

/// Answers queries against a record store and a shared vector index.
///
/// Stateless per call: concurrent queries share nothing but the published
/// index snapshot and the store.
pub struct QueryRouter {
    store: Arc<dyn RecordStore>,
    index: Arc<SharedIndex>,
    params: RouterParams,
}

impl QueryRouter {
    pub fn new(store: Arc<dyn RecordStore>, index: Arc<SharedIndex>, params: RouterParams) -> Self {
        Self {
            store,
            index,
            params,
        }
    }

    pub fn params(&self) -> &RouterParams {
        &self.params
    }

    pub fn index(&self) -> &Arc<SharedIndex> {
        &self.index
    }

    /// Classify, extract, route, and gather results for `text`.
    ///
    /// `now` anchors relative dates. The same `(text, now)` against the same
    /// data always yields the same response.
    pub async fn query(&self, text: &str, now: NaiveDate) -> Result<QueryResponse> {
        let classification = classify(text);
        let parameters = extract(text, now);
        let route = route(
            classification.intent,
            classification.confidence,
            &parameters,
            self.params.confidence_threshold,
        );
        debug!(
            intent = %classification.intent,
            confidence = classification.confidence,
            ?parameters,
            ?route,
            "routing query"
        );

        let mut paths = Vec::with_capacity(2);
        let results = match route {
            Route::Vector => {
                paths.push(ResultSource::Vector);
                self.vector_results(text, &parameters).await?
            }
            Route::Relational { template, fallback } => {
                paths.push(ResultSource::Relational);
                let rows = self.relational_results(template, &parameters).await?;
                if rows.is_empty() && fallback {
                    debug!("no relational rows, falling back to vector search");
                    paths.push(ResultSource::Vector);
                    self.vector_results(text, &parameters).await?
                } else {
                    rows
                }
            }
        };

        Ok(QueryResponse {
            query: text.to_string(),
            intent: classification.intent,
            confidence: classification.confidence,
            parameters,
            paths,
            results,
        })
    }

    async fn relational_results(
        &self,
        template: Intent,
        parameters: &Parameters,
    ) -> Result<Vec<QueryResult>> {
        let Some(query) = sql::generate(template, parameters, self.params.relational_limit) else {
            return Ok(Vec::new());
        };
        debug!(sql = %query.sql, binds = query.binds.len(), "running relational query");
        let rows = self.store.fetch(&query).await.map_err(Error::Store)?;
        Ok(rows.into_iter().map(QueryResult::relational).collect())
    }

    async fn vector_results(&self, text: &str, parameters: &Parameters) -> Result<Vec<QueryResult>> {
        let search_text = parameters.item_name.as_deref().unwrap_or(text);
        let hits = self
            .index
            .search(search_text, self.params.top_k, self.params.min_score);
        debug!(search_text, hits = hits.len(), "vector search");
        self.join_hits(&hits).await
    }

    /// Items most like an already indexed item, best first.
    ///
    /// Unknown ids yield an empty list.
    pub async fn similar_items(&self, item_id: i64) -> Result<Vec<QueryResult>> {
        let hits = self
            .index
            .similar_to(item_id, self.params.top_k, self.params.min_score);
        debug!(item_id, hits = hits.len(), "similar items");
        self.join_hits(&hits).await
    }

    async fn join_hits(&self, hits: &[SearchHit]) -> Result<Vec<QueryResult>> {
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = hits.iter().map(|h| h.item_id).collect();
        let mut by_id: HashMap<i64, _> = self
            .store
            .items_by_ids(&ids)
            .await
            .map_err(Error::Store)?
            .into_iter()
            .map(|item| (item.item_id, item))
            .collect();

        let results: Vec<QueryResult> = hits
            .iter()
            .filter_map(|hit| {
                by_id
                    .remove(&hit.item_id)
                    .map(|item| QueryResult::vector(item, hit.score))
            })
            .collect();
        if results.len() < hits.len() {
            debug!(
                dropped = hits.len() - results.len(),
                "vector hits missing from the record store"
            );
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DateRange;

    #[test]
    fn test_route_table() {
        let empty = Parameters::default();
        let with_date = Parameters {
            date_range: Some(DateRange::day(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())),
            ..Default::default()
        };

        assert_eq!(route(Intent::SemanticSearch, 0.95, &with_date, 0.5), Route::Vector);
        assert_eq!(route(Intent::ItemSearch, 0.4, &empty, 0.5), Route::Vector);
        assert_eq!(route(Intent::Unknown, 0.0, &empty, 0.5), Route::Vector);
        assert_eq!(
            route(Intent::Unknown, 0.0, &with_date, 0.5),
            Route::Relational {
                template: Intent::ListItems,
                fallback: true
            }
        );
        assert_eq!(
            route(Intent::SpendingAnalysis, 0.9, &empty, 0.5),
            Route::Relational {
                template: Intent::SpendingAnalysis,
                fallback: false
            }
        );
        assert_eq!(
            route(Intent::ItemSearch, 0.4, &with_date, 0.5),
            Route::Relational {
                template: Intent::ItemSearch,
                fallback: true
            }
        );
    }

    #[test]
    fn test_threshold_is_configurable() {
        let empty = Parameters::default();
        assert_eq!(route(Intent::ListItems, 0.7, &empty, 0.8), Route::Vector);
        assert!(matches!(
            route(Intent::ListItems, 0.7, &empty, 0.5),
            Route::Relational { .. }
        ));
    }
}
