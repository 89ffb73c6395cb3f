pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod stores;
pub mod traits;

pub use chunking::{chunk_text, normalize_whitespace, ChunkingConfig};
pub use config::{EmbeddingBackendKind, EmbeddingSettings, VectorStoreSettings};
pub use embeddings::{
    build_embedder, CharacterNgramEmbedder, Embedder, EmbeddingGateway, TeiEmbedder,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
#[cfg(feature = "fastembed")]
pub use embeddings::FastEmbedder;
pub use error::{EmbedError, IngestError, SearchError};
pub use extractor::{ensure_pdf_content_type, LopdfExtractor, PageText, PdfExtractor};
pub use ingest::{discover_pdf_files, DocumentIndexer};
pub use models::{
    Chunk, HitPayload, IndexReport, Point, PointPayload, SearchHit, SearchQuery, SearchResult,
    DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT,
};
pub use orchestrator::SearchCoordinator;
pub use stores::{InMemoryStore, QdrantStore};
pub use traits::VectorIndex;
