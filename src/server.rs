//! HTTP query server.
//!
//! Exposes the query engine as a small JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/query` | Answer `{ "text": "...", "date": "YYYY-MM-DD" }` |
//! | `GET`  | `/stats` | Receipt, item, and index counts |
//! | `GET`  | `/items/{id}/similar` | Indexed items most like item `id` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "text must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `timeout` (408),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front-ends
//! can call the API directly.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use receipt_query_core::error::Error;
use receipt_query_core::models::{QueryResponse, QueryResult};

use crate::config::Config;
use crate::engine::Engine;
use crate::query_cmd::resolve_now;
use crate::stats::{collect_stats, Stats};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    engine: Arc<Engine>,
}

/// Starts the HTTP server on `[server].bind`.
///
/// Opens the engine once (loading or rebuilding the index) and serves
/// until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let engine = Engine::open(config).await?;

    let state = AppState {
        config: Arc::new(config.clone()),
        engine: Arc::new(engine),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/query", post(handle_query))
        .route("/stats", get(handle_stats))
        .route("/items/{id}/similar", get(handle_similar))
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "query server listening");
    println!("Query server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        match err {
            Error::Timeout(_) => AppError {
                status: StatusCode::REQUEST_TIMEOUT,
                code: "timeout",
                message: err.to_string(),
            },
            other => {
                error!(error = %other, "query failed");
                internal(other.to_string())
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    text: String,
    /// Anchor for relative dates; defaults to today.
    #[serde(default)]
    date: Option<String>,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    if req.text.trim().is_empty() {
        return Err(bad_request("text must not be empty"));
    }
    let now = resolve_now(req.date.as_deref()).map_err(|e| bad_request(format!("{e:#}")))?;
    let response = state.engine.query(&req.text, now).await?;
    Ok(Json(response))
}

// ============ GET /stats ============

async fn handle_stats(State(state): State<AppState>) -> Result<Json<Stats>, AppError> {
    let stats = collect_stats(&state.config, &state.engine)
        .await
        .map_err(|e| internal(format!("{e:#}")))?;
    Ok(Json(stats))
}

// ============ GET /items/{id}/similar ============

#[derive(Debug, Serialize)]
struct SimilarResponse {
    item_id: i64,
    results: Vec<QueryResult>,
}

async fn handle_similar(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
) -> Result<Json<SimilarResponse>, AppError> {
    if !state.engine.index().snapshot().contains(item_id) {
        return Err(not_found(format!("item {item_id} is not indexed")));
    }
    let results = state.engine.similar(item_id).await?;
    Ok(Json(SimilarResponse { item_id, results }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnswerConfig, DbConfig, IndexConfig, RetrievalConfig, ServerConfig};
    use crate::migrate;
    use chrono::NaiveDate;
    use receipt_query_core::models::{NewItem, NewReceipt};
    use std::time::Duration;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn test_state(root: &std::path::Path) -> AppState {
        let config = Config {
            db: DbConfig {
                path: root.join("rq.sqlite"),
            },
            index: IndexConfig {
                path: root.join("rq.index"),
            },
            retrieval: RetrievalConfig::default(),
            server: ServerConfig::default(),
            answer: AnswerConfig::default(),
        };
        migrate::run_migrations(&config).await.unwrap();
        let engine = Engine::open(&config).await.unwrap();
        engine
            .ingest(&[NewReceipt {
                store_name: "Walmart".into(),
                receipt_date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
                total_amount: None,
                items: ["Organic Milk", "Chocolate Milk", "Whole Wheat Bread"]
                    .iter()
                    .map(|name| NewItem {
                        item_name: name.to_string(),
                        quantity: 1.0,
                        unit_price: None,
                        total_price: 3.0,
                    })
                    .collect(),
            }])
            .await
            .unwrap();
        AppState {
            config: Arc::new(config),
            engine: Arc::new(engine),
        }
    }

    #[tokio::test]
    async fn test_timeout_maps_to_408() {
        let resp = AppError::from(Error::Timeout(Duration::from_millis(50))).into_response();
        assert_eq!(resp.status(), StatusCode::REQUEST_TIMEOUT);
        let body = body_json(resp).await;
        assert_eq!(body["error"]["code"], "timeout");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("timed out"));
    }

    #[tokio::test]
    async fn test_store_error_maps_to_500() {
        let resp = AppError::from(Error::Store(anyhow::anyhow!("database is locked"))).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await["error"]["code"], "internal");
    }

    #[tokio::test]
    async fn test_query_rejects_blank_text_and_bad_date() {
        let tmp = tempfile::TempDir::new().unwrap();
        let state = test_state(tmp.path()).await;

        let req = QueryRequest {
            text: "   ".into(),
            date: None,
        };
        let err = handle_query(State(state.clone()), Json(req)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let req = QueryRequest {
            text: "what did I buy".into(),
            date: Some("06/15/2024".into()),
        };
        let err = handle_query(State(state), Json(req)).await.unwrap_err();
        assert_eq!(err.code, "bad_request");
    }

    #[tokio::test]
    async fn test_similar_endpoint() {
        let tmp = tempfile::TempDir::new().unwrap();
        let state = test_state(tmp.path()).await;

        let Json(resp) = handle_similar(State(state.clone()), Path(1)).await.unwrap();
        assert_eq!(resp.item_id, 1);
        assert_eq!(resp.results[0].item_id, Some(2));

        let err = handle_similar(State(state), Path(42)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.code, "not_found");
    }
}
