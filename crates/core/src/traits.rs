use crate::error::SearchError;
use crate::models::{Point, SearchHit};
use async_trait::async_trait;

/// Narrow capability over a vector database. The collection must already
/// exist with a dimensionality matching the vectors passed in.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Inserts or overwrites points by id.
    async fn upsert(&self, collection: &str, points: &[Point]) -> Result<(), SearchError>;

    /// Nearest neighbours of `vector`, best match first.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>, SearchError>;
}
