use crate::models::{Point, SearchHit};
use crate::traits::VectorIndex;
use crate::SearchError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

const BACKEND: &str = "memory";

struct Collection {
    dimensions: usize,
    order: Vec<Uuid>,
    points: HashMap<Uuid, Point>,
}

/// Process-local vector store with Qdrant's collection semantics: collections
/// are created up front with a fixed dimensionality, and points are scored by
/// dot product.
#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(self, name: impl Into<String>, dimensions: usize) -> Self {
        self.create_collection(name, dimensions);
        self
    }

    pub fn create_collection(&self, name: impl Into<String>, dimensions: usize) {
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        collections.entry(name.into()).or_insert_with(|| Collection {
            dimensions,
            order: Vec::new(),
            points: HashMap::new(),
        });
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(collection)
            .map_or(0, |stored| stored.points.len())
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Stored points in first-insertion order.
    pub fn points(&self, collection: &str) -> Vec<Point> {
        let collections = self
            .collections
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        collections
            .get(collection)
            .map(|stored| {
                stored
                    .order
                    .iter()
                    .filter_map(|id| stored.points.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn missing_collection(name: &str) -> SearchError {
    SearchError::BackendResponse {
        backend: BACKEND.to_string(),
        details: format!("collection `{name}` does not exist"),
    }
}

fn dimension_mismatch(expected: usize, actual: usize) -> SearchError {
    SearchError::BackendResponse {
        backend: BACKEND.to_string(),
        details: format!("wrong vector dimension: expected {expected}, got {actual}"),
    }
}

fn dot(left: &[f32], right: &[f32]) -> f32 {
    left.iter().zip(right).map(|(a, b)| a * b).sum()
}

#[async_trait]
impl VectorIndex for InMemoryStore {
    async fn upsert(&self, collection: &str, points: &[Point]) -> Result<(), SearchError> {
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let stored = collections
            .get_mut(collection)
            .ok_or_else(|| missing_collection(collection))?;

        // Validate the whole batch first so a bad point leaves nothing behind.
        if let Some(point) = points
            .iter()
            .find(|point| point.vector.len() != stored.dimensions)
        {
            return Err(dimension_mismatch(stored.dimensions, point.vector.len()));
        }

        for point in points {
            if stored.points.insert(point.id, point.clone()).is_none() {
                stored.order.push(point.id);
            }
        }

        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let collections = self
            .collections
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let stored = collections
            .get(collection)
            .ok_or_else(|| missing_collection(collection))?;

        if vector.len() != stored.dimensions {
            return Err(dimension_mismatch(stored.dimensions, vector.len()));
        }

        let mut scored = stored
            .order
            .iter()
            .filter_map(|id| stored.points.get(id))
            .map(|point| (dot(&point.vector, vector), point))
            .collect::<Vec<_>>();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|left, right| right.0.total_cmp(&left.0));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, point)| SearchHit {
                score,
                id: point.id.to_string(),
                payload: point.payload.clone().into(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PointPayload;

    fn point(vector: Vec<f32>, text: &str) -> Point {
        Point {
            id: Uuid::new_v4(),
            vector,
            payload: PointPayload {
                document_id: Uuid::nil(),
                page: 1,
                chunk_index: 0,
                text: text.to_string(),
                source: "test.pdf".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn search_orders_by_descending_score() {
        let store = InMemoryStore::new().with_collection("docs", 2);
        store
            .upsert(
                "docs",
                &[
                    point(vec![0.0, 1.0], "far"),
                    point(vec![1.0, 0.0], "near"),
                    point(vec![0.6, 0.8], "middle"),
                ],
            )
            .await
            .unwrap();

        let hits = store.search("docs", &[1.0, 0.0], 2).await.unwrap();
        let texts = hits
            .iter()
            .map(|hit| hit.payload.text.clone().unwrap_or_default())
            .collect::<Vec<_>>();

        assert_eq!(texts, vec!["near", "middle"]);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn upsert_overwrites_by_id() {
        let store = InMemoryStore::new().with_collection("docs", 2);
        let mut first = point(vec![1.0, 0.0], "before");
        store.upsert("docs", &[first.clone()]).await.unwrap();

        first.payload.text = "after".to_string();
        store.upsert("docs", &[first.clone()]).await.unwrap();

        let points = store.points("docs");
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].payload.text, "after");
    }

    #[tokio::test]
    async fn missing_collection_is_a_backend_error() {
        let store = InMemoryStore::new();
        let upsert = store.upsert("docs", &[point(vec![1.0], "x")]).await;
        let search = store.search("docs", &[1.0], 5).await;

        assert!(matches!(upsert, Err(SearchError::BackendResponse { .. })));
        assert!(matches!(search, Err(SearchError::BackendResponse { .. })));
    }

    #[tokio::test]
    async fn dimension_mismatch_rejects_whole_batch() {
        let store = InMemoryStore::new().with_collection("docs", 2);
        let result = store
            .upsert(
                "docs",
                &[point(vec![1.0, 0.0], "ok"), point(vec![1.0, 0.0, 0.0], "bad")],
            )
            .await;

        assert!(matches!(result, Err(SearchError::BackendResponse { .. })));
        assert!(store.is_empty("docs"));
    }

    #[tokio::test]
    async fn empty_collection_returns_no_hits() {
        let store = InMemoryStore::new().with_collection("docs", 3);
        let hits = store.search("docs", &[1.0, 0.0, 0.0], 10).await.unwrap();
        assert!(hits.is_empty());
    }
}
