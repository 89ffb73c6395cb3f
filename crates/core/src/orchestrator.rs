use crate::embeddings::EmbeddingGateway;
use crate::error::EmbedError;
use crate::models::{SearchQuery, SearchResult, MAX_SEARCH_LIMIT};
use crate::traits::VectorIndex;
use crate::SearchError;
use std::sync::Arc;
use tracing::debug;

/// Embeds a query and hands the vector straight to nearest-neighbour search.
pub struct SearchCoordinator<V: ?Sized> {
    embeddings: Arc<EmbeddingGateway>,
    store: Arc<V>,
    collection: String,
}

impl<V> SearchCoordinator<V>
where
    V: VectorIndex + ?Sized,
{
    pub fn new(
        embeddings: Arc<EmbeddingGateway>,
        store: Arc<V>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            embeddings,
            store,
            collection: collection.into(),
        }
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResult, SearchError> {
        validate(query)?;

        let vectors = self.embeddings.embed(&[query.query.clone()]).await?;
        let vector = vectors
            .into_iter()
            .next()
            .ok_or(EmbedError::CountMismatch {
                expected: 1,
                actual: 0,
            })?;

        let hits = self
            .store
            .search(&self.collection, &vector, query.limit)
            .await?;
        debug!(collection = %self.collection, limit = query.limit, hits = hits.len(), "search finished");

        Ok(SearchResult { hits })
    }
}

fn validate(query: &SearchQuery) -> Result<(), SearchError> {
    if query.query.trim().is_empty() {
        return Err(SearchError::InvalidQuery("query is empty".to_string()));
    }

    if !(1..=MAX_SEARCH_LIMIT).contains(&query.limit) {
        return Err(SearchError::InvalidQuery(format!(
            "limit must be between 1 and {MAX_SEARCH_LIMIT}, got {}",
            query.limit
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{CharacterNgramEmbedder, Embedder};
    use crate::models::{Point, PointPayload, SearchHit};
    use crate::stores::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use uuid::Uuid;

    const DIMENSIONS: usize = 256;
    const COLLECTION: &str = "documents";

    #[derive(Default)]
    struct RecordingIndex {
        limits: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl VectorIndex for RecordingIndex {
        async fn upsert(&self, _collection: &str, _points: &[Point]) -> Result<(), SearchError> {
            Ok(())
        }

        async fn search(
            &self,
            _collection: &str,
            _vector: &[f32],
            limit: usize,
        ) -> Result<Vec<SearchHit>, SearchError> {
            self.limits.lock().unwrap().push(limit);
            Ok(Vec::new())
        }
    }

    fn gateway() -> Arc<EmbeddingGateway> {
        Arc::new(EmbeddingGateway::from_embedder(Arc::new(
            CharacterNgramEmbedder::new(DIMENSIONS),
        ) as Arc<dyn Embedder>))
    }

    async fn populated_store(texts: &[&str]) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new().with_collection(COLLECTION, DIMENSIONS));
        let embeddings = gateway();
        let owned = texts.iter().map(|text| text.to_string()).collect::<Vec<_>>();
        let vectors = embeddings.embed(&owned).await.unwrap();
        let document_id = Uuid::new_v4();

        let points = owned
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(index, (text, vector))| Point {
                id: Uuid::new_v4(),
                vector,
                payload: PointPayload {
                    document_id,
                    page: 1,
                    chunk_index: index as u32,
                    text,
                    source: "manual.pdf".to_string(),
                },
            })
            .collect::<Vec<_>>();
        store.upsert(COLLECTION, &points).await.unwrap();
        store
    }

    #[tokio::test]
    async fn search_returns_at_most_limit_hits_by_score() {
        let store = populated_store(&[
            "hydraulic pump pressure",
            "hydraulic pump failure",
            "electrical wiring diagram",
            "pump seal replacement",
            "gearbox oil change",
            "pressure relief valve",
            "coolant temperature sensor",
        ])
        .await;
        let coordinator = SearchCoordinator::new(gateway(), store, COLLECTION);

        let result = coordinator
            .search(&SearchQuery::new("hydraulic pump").with_limit(5))
            .await
            .unwrap();

        assert_eq!(result.hits.len(), 5);
        assert!(result
            .hits
            .windows(2)
            .all(|pair| pair[0].score >= pair[1].score));
        let best = result.hits[0].payload.text.as_deref().unwrap_or_default();
        assert!(best.starts_with("hydraulic pump"));
    }

    #[tokio::test]
    async fn empty_collection_returns_no_hits() {
        let store = Arc::new(InMemoryStore::new().with_collection(COLLECTION, DIMENSIONS));
        let coordinator = SearchCoordinator::new(gateway(), store, COLLECTION);

        let result = coordinator.search(&SearchQuery::new("anything")).await.unwrap();
        assert!(result.hits.is_empty());
    }

    #[tokio::test]
    async fn caller_limit_is_passed_through() {
        let store = Arc::new(RecordingIndex::default());
        let coordinator = SearchCoordinator::new(gateway(), Arc::clone(&store), COLLECTION);

        coordinator.search(&SearchQuery::new("flow")).await.unwrap();
        coordinator
            .search(&SearchQuery::new("flow").with_limit(50))
            .await
            .unwrap();

        assert_eq!(*store.limits.lock().unwrap(), vec![10, 50]);
    }

    #[tokio::test]
    async fn invalid_queries_are_rejected_before_search() {
        let store = Arc::new(RecordingIndex::default());
        let coordinator = SearchCoordinator::new(gateway(), Arc::clone(&store), COLLECTION);

        for query in [
            SearchQuery::new(""),
            SearchQuery::new("   "),
            SearchQuery::new("valve").with_limit(0),
            SearchQuery::new("valve").with_limit(51),
        ] {
            let error = coordinator.search(&query).await.unwrap_err();
            assert!(matches!(error, SearchError::InvalidQuery(_)));
            assert!(error.is_client_error());
        }

        assert!(store.limits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_collection_surfaces_backend_error() {
        let store = Arc::new(InMemoryStore::new());
        let coordinator = SearchCoordinator::new(gateway(), store, COLLECTION);

        let error = coordinator.search(&SearchQuery::new("valve")).await.unwrap_err();
        assert!(matches!(error, SearchError::BackendResponse { .. }));
        assert!(!error.is_client_error());
    }
}
