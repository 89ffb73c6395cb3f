use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const MAX_SEARCH_LIMIT: usize = 50;

/// A window of whitespace-normalized page text. Offsets are character
/// offsets into the normalized text, not into the raw extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub start_char: usize,
    pub end_char: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointPayload {
    pub document_id: Uuid,
    pub page: u32,
    #[serde(rename = "chunk", alias = "chunk_index")]
    pub chunk_index: u32,
    pub text: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

/// Payload as read back from the store. Points written by other tools may
/// lack any of the fields, so every field is optional and absent ones are
/// left out when serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HitPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl HitPayload {
    pub fn from_value(value: &Value) -> Self {
        let string_at = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        let number_at = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_u64)
                .and_then(|number| u32::try_from(number).ok())
        };

        Self {
            document_id: string_at("document_id"),
            page: number_at("page"),
            chunk: number_at("chunk").or_else(|| number_at("chunk_index")),
            text: string_at("text"),
            source: string_at("source"),
        }
    }
}

impl From<PointPayload> for HitPayload {
    fn from(value: PointPayload) -> Self {
        Self {
            document_id: Some(value.document_id.to_string()),
            page: Some(value.page),
            chunk: Some(value.chunk_index),
            text: Some(value.text),
            source: Some(value.source),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub score: f32,
    pub id: String,
    #[serde(default)]
    pub payload: HitPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    pub document_id: Uuid,
    pub chunks_indexed: usize,
}
