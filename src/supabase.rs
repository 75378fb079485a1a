//! Supabase (PostgREST + pgvector) vector store.
//!
//! Writes go to `POST {url}/rest/v1/{table}` and queries call the
//! configured Postgres function through `POST {url}/rest/v1/rpc/{function}`.
//! The function receives the [`MatchQuery`] JSON as-is and must return rows
//! shaped like `{ id, content, metadata, similarity }`. Rows that carry
//! `page_content` instead of `content` are accepted.
//!
//! Inserts are plain inserts; re-ingesting the same file adds duplicate
//! rows unless the table has its own unique constraint.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use ragline_core::models::StoreId;
use ragline_core::store::{MatchQuery, NewRecord, StoreRow, VectorStore};

use crate::config::StoreConfig;

#[derive(Serialize)]
struct InsertRow<'a> {
    content: &'a str,
    metadata: Value,
    embedding: &'a [f32],
}

pub struct SupabaseStore {
    http: reqwest::Client,
    url: String,
    key: String,
    table: String,
    match_function: String,
}

impl SupabaseStore {
    /// Build a store from configuration. Both `supabase_url` and
    /// `supabase_key` must be set.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let url = config
            .supabase_url
            .clone()
            .filter(|u| !u.is_empty())
            .context("SUPABASE_URL not set")?;
        let key = config
            .supabase_key
            .clone()
            .filter(|k| !k.is_empty())
            .context("SUPABASE_KEY not set")?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            url: url.trim_end_matches('/').to_string(),
            key,
            table: config.table.clone(),
            match_function: config.match_function.clone(),
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}/rest/v1/{}", self.url, path))
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }
}

async fn json_or_error(response: reqwest::Response, what: &str) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("Supabase {} failed ({}): {}", what, status, body);
    }
    Ok(response.json().await?)
}

#[async_trait]
impl VectorStore for SupabaseStore {
    fn name(&self) -> &str {
        "supabase"
    }

    async fn add_records(&self, records: Vec<NewRecord>) -> Result<Vec<StoreId>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<InsertRow> = records
            .iter()
            .map(|r| InsertRow {
                content: &r.content,
                metadata: r.metadata.to_value(),
                embedding: &r.embedding,
            })
            .collect();

        debug!(table = %self.table, rows = rows.len(), "inserting rows");
        let response = self
            .post(&self.table)
            .header("Prefer", "return=representation")
            .json(&rows)
            .send()
            .await
            .with_context(|| format!("insert into {}", self.table))?;

        let json = json_or_error(response, "insert").await?;
        parse_inserted_ids(&json, records.len())
    }

    async fn match_records(&self, query: &MatchQuery) -> Result<Vec<StoreRow>> {
        let response = self
            .post(&format!("rpc/{}", self.match_function))
            .json(query)
            .send()
            .await
            .with_context(|| format!("rpc {}", self.match_function))?;

        let json = json_or_error(response, "match").await?;
        parse_match_rows(json)
    }
}

/// Ids from a `return=representation` insert reply, in input order.
pub fn parse_inserted_ids(json: &Value, expected: usize) -> Result<Vec<StoreId>> {
    let rows = json.as_array().context("insert reply is not an array")?;
    if rows.len() != expected {
        bail!("inserted {} rows, expected {}", rows.len(), expected);
    }
    rows.iter()
        .map(|row| {
            row.get("id")
                .cloned()
                .map(StoreId::from)
                .context("inserted row has no id")
        })
        .collect()
}

/// Parse the rows returned by the match function.
pub fn parse_match_rows(json: Value) -> Result<Vec<StoreRow>> {
    let Value::Array(rows) = json else {
        bail!("match reply is not an array");
    };

    rows.into_iter()
        .map(|mut row| {
            let id = row
                .get_mut("id")
                .map(Value::take)
                .map(StoreId::from)
                .context("match row has no id")?;
            let content = row
                .get("content")
                .and_then(Value::as_str)
                .or_else(|| row.get("page_content").and_then(Value::as_str))
                .map(str::to_string);
            let metadata = row
                .get_mut("metadata")
                .map(Value::take)
                .unwrap_or(Value::Null);
            let similarity = row
                .get("similarity")
                .and_then(Value::as_f64)
                .context("match row has no similarity")?;
            Ok(StoreRow {
                id,
                content,
                metadata,
                similarity,
            })
        })
        .collect()
}
