use crate::chunking::{chunk_text, ChunkingConfig};
use crate::embeddings::EmbeddingGateway;
use crate::extractor::{ensure_pdf_content_type, PdfExtractor};
use crate::models::{IndexReport, Point, PointPayload};
use crate::traits::VectorIndex;
use crate::IngestError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Turns one uploaded PDF into points in a single collection. Every call
/// creates a new document id, so re-indexing never touches earlier points.
pub struct DocumentIndexer<X: ?Sized, V: ?Sized> {
    extractor: Arc<X>,
    embeddings: Arc<EmbeddingGateway>,
    store: Arc<V>,
    collection: String,
    chunking: ChunkingConfig,
}

impl<X, V> DocumentIndexer<X, V>
where
    X: PdfExtractor + ?Sized + 'static,
    V: VectorIndex + ?Sized,
{
    pub fn new(
        extractor: Arc<X>,
        embeddings: Arc<EmbeddingGateway>,
        store: Arc<V>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            extractor,
            embeddings,
            store,
            collection: collection.into(),
            chunking: ChunkingConfig::default(),
        }
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Result<Self, IngestError> {
        chunking.validate()?;
        self.chunking = chunking;
        Ok(self)
    }

    /// Rejects non-PDF content types before doing any work.
    pub async fn index_upload(
        &self,
        bytes: impl Into<Vec<u8>>,
        filename: &str,
        content_type: &str,
    ) -> Result<IndexReport, IngestError> {
        ensure_pdf_content_type(content_type)?;
        self.index_document(bytes, filename).await
    }

    /// Extracts, chunks per page, embeds and upserts all chunks in one batch.
    /// Nothing is written unless every step before the upsert succeeds.
    /// PDF parsing runs on the blocking pool.
    pub async fn index_document(
        &self,
        bytes: impl Into<Vec<u8>>,
        filename: &str,
    ) -> Result<IndexReport, IngestError> {
        let extractor = Arc::clone(&self.extractor);
        let bytes = bytes.into();
        let pages =
            tokio::task::spawn_blocking(move || extractor.extract_pages(&bytes)).await??;
        if pages.iter().all(|page| page.text.trim().is_empty()) {
            return Err(IngestError::NoExtractableText);
        }

        let document_id = Uuid::new_v4();
        let mut points = Vec::new();

        for page in &pages {
            let texts = chunk_text(&page.text, &self.chunking)?
                .into_iter()
                .map(|chunk| chunk.text)
                .collect::<Vec<_>>();
            if texts.is_empty() {
                continue;
            }

            let vectors = self.embeddings.embed(&texts).await?;
            debug!(%document_id, page = page.number, chunks = texts.len(), "embedded page");

            for (chunk_index, (text, vector)) in texts.into_iter().zip(vectors).enumerate() {
                points.push(Point {
                    id: Uuid::new_v4(),
                    vector,
                    payload: PointPayload {
                        document_id,
                        page: page.number,
                        chunk_index: chunk_index as u32,
                        text,
                        source: filename.to_string(),
                    },
                });
            }
        }

        self.store.upsert(&self.collection, &points).await?;

        info!(
            %document_id,
            source = filename,
            pages = pages.len(),
            chunks = points.len(),
            collection = %self.collection,
            "indexed document"
        );

        Ok(IndexReport {
            document_id,
            chunks_indexed: points.len(),
        })
    }
}
