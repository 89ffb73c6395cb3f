use crate::config::VectorStoreSettings;
use crate::models::{HitPayload, Point, SearchHit};
use crate::traits::VectorIndex;
use crate::SearchError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};
use tracing::debug;

const BACKEND: &str = "qdrant";

/// Qdrant over its REST API. Collections are never created here.
pub struct QdrantStore {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl QdrantStore {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, SearchError> {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        url::Url::parse(&endpoint)?;

        Ok(Self {
            endpoint,
            api_key: None,
            client: Client::new(),
        })
    }

    pub fn from_settings(settings: &VectorStoreSettings) -> Result<Self, SearchError> {
        let store = Self::new(settings.url.as_str())?;
        Ok(match &settings.api_key {
            Some(key) if !key.trim().is_empty() => store.with_api_key(key.trim()),
            _ => store,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }
}

async fn ensure_success(response: Response) -> Result<Response, SearchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(SearchError::BackendResponse {
        backend: BACKEND.to_string(),
        details: if body.is_empty() {
            status.to_string()
        } else {
            format!("{status}: {body}")
        },
    })
}

fn point_to_json(point: &Point) -> Result<Value, SearchError> {
    Ok(json!({
        "id": point.id.to_string(),
        "vector": point.vector,
        "payload": serde_json::to_value(&point.payload)?,
    }))
}

/// Qdrant ids are either UUID strings or unsigned integers.
fn id_to_string(id: &Value) -> String {
    match id {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_search_hits(parsed: &Value) -> Result<Vec<SearchHit>, SearchError> {
    let hits = parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .ok_or_else(|| SearchError::BackendResponse {
            backend: BACKEND.to_string(),
            details: "search response has no result array".to_string(),
        })?;

    Ok(hits
        .iter()
        .map(|hit| SearchHit {
            score: hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0) as f32,
            id: hit.pointer("/id").map(id_to_string).unwrap_or_default(),
            payload: hit
                .pointer("/payload")
                .map(HitPayload::from_value)
                .unwrap_or_default(),
        })
        .collect())
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn upsert(&self, collection: &str, points: &[Point]) -> Result<(), SearchError> {
        if points.is_empty() {
            return Ok(());
        }

        let points = points
            .iter()
            .map(point_to_json)
            .collect::<Result<Vec<_>, SearchError>>()?;

        let request = self
            .client
            .put(format!(
                "{}/collections/{}/points?wait=true",
                self.endpoint, collection
            ))
            .json(&json!({ "points": points }));

        ensure_success(self.authorized(request).send().await?).await?;
        debug!(collection, count = points.len(), "upserted points");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let request = self
            .client
            .post(format!(
                "{}/collections/{}/points/search",
                self.endpoint, collection
            ))
            .json(&json!({
                "vector": vector,
                "limit": limit,
                "with_payload": true,
            }));

        let response = ensure_success(self.authorized(request).send().await?).await?;
        let parsed: Value = response.json().await?;
        parse_search_hits(&parsed)
    }
}
