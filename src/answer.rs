//! Optional prose answers from an OpenAI-compatible chat endpoint.
//!
//! Runs after retrieval has finished: the model only rephrases the
//! [`QueryResponse`] it is given and never influences routing.

use std::time::Duration;

use anyhow::{bail, Result};
use serde_json::json;

use receipt_query_core::models::QueryResponse;

use crate::config::AnswerConfig;

const SYSTEM_PROMPT: &str = "You turn grocery receipt query results into short natural-language \
answers. Use only the results provided. Mention stores, dates, and amounts when they matter. \
If there are no results, say nothing matched and suggest another time period.";

/// Ask the configured chat model to phrase `response` as an answer.
pub async fn generate_answer(config: &AnswerConfig, response: &QueryResponse) -> Result<String> {
    let api_key = std::env::var(&config.api_key_env)
        .map_err(|_| anyhow::anyhow!("{} not set", config.api_key_env))?;
    let model = config
        .model
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("answer.model required"))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let body = request_body(model, config.max_tokens, response)?;
    let url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));

    let resp = client
        .post(&url)
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        let body_text = resp.text().await.unwrap_or_default();
        bail!("answer API error {}: {}", status, body_text);
    }

    let json: serde_json::Value = resp.json().await?;
    parse_chat_response(&json)
}

fn request_body(
    model: &str,
    max_tokens: u32,
    response: &QueryResponse,
) -> Result<serde_json::Value> {
    let results = serde_json::to_string_pretty(response)?;
    let user_prompt = format!(
        "Question: \"{}\"\n\nResults:\n{}\n\nAnswer the question.",
        response.query, results
    );
    Ok(json!({
        "model": model,
        "max_tokens": max_tokens,
        "temperature": 0.2,
        "messages": [
            {"role": "system", "content": SYSTEM_PROMPT},
            {"role": "user", "content": user_prompt},
        ],
    }))
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    let content = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing choices[0].message.content"))?;
    let content = content.trim();
    if content.is_empty() {
        bail!("Invalid chat response: empty content");
    }
    Ok(content.to_string())
}
