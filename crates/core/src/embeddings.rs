use crate::config::{EmbeddingBackendKind, EmbeddingSettings};
use crate::error::EmbedError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;

const NGRAM_MODEL_PREFIX: &str = "char-trigram-";

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;

    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

#[derive(Debug, Clone)]
pub struct CharacterNgramEmbedder {
    model_id: String,
    dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIMENSIONS)
    }
}

impl CharacterNgramEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            model_id: format!("{NGRAM_MODEL_PREFIX}{dimensions}"),
            dimensions,
        }
    }

    /// Accepts identifiers of the form `char-trigram-<dimensions>`.
    pub fn from_model_id(model_id: &str) -> Result<Self, EmbedError> {
        model_id
            .strip_prefix(NGRAM_MODEL_PREFIX)
            .and_then(|dimensions| dimensions.parse::<usize>().ok())
            .filter(|dimensions| *dimensions > 0)
            .map(Self::new)
            .ok_or_else(|| EmbedError::UnsupportedModel {
                backend: EmbeddingBackendKind::Ngram.to_string(),
                model: model_id.to_string(),
            })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

/// Client for a text-embeddings-inference server hosting one model.
pub struct TeiEmbedder {
    endpoint: String,
    model_id: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct TeiInfo {
    model_id: String,
}

impl TeiEmbedder {
    /// Verifies that the server at `endpoint` serves `model_id`.
    pub async fn connect(endpoint: &str, model_id: &str) -> Result<Self, EmbedError> {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        url::Url::parse(&endpoint).map_err(|error| EmbedError::Backend {
            backend: EmbeddingBackendKind::Tei.to_string(),
            details: format!("invalid endpoint {endpoint}: {error}"),
        })?;

        let client = Client::new();
        let response = client.get(format!("{endpoint}/info")).send().await?;
        if !response.status().is_success() {
            return Err(EmbedError::Backend {
                backend: EmbeddingBackendKind::Tei.to_string(),
                details: format!("{endpoint}/info returned {}", response.status()),
            });
        }

        let info: TeiInfo = response.json().await?;
        if info.model_id != model_id {
            return Err(EmbedError::UnsupportedModel {
                backend: format!("{} ({} serves {})", EmbeddingBackendKind::Tei, endpoint, info.model_id),
                model: model_id.to_string(),
            });
        }

        Ok(Self {
            endpoint,
            model_id: info.model_id,
            client,
        })
    }
}

#[async_trait]
impl Embedder for TeiEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let response = self
            .client
            .post(format!("{}/embed", self.endpoint))
            .json(&json!({
                "inputs": texts,
                "normalize": true,
                "truncate": true,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Backend {
                backend: EmbeddingBackendKind::Tei.to_string(),
                details: format!("{status}: {body}"),
            });
        }

        Ok(response.json::<Vec<Vec<f32>>>().await?)
    }
}

#[cfg(feature = "fastembed")]
pub use local::FastEmbedder;

#[cfg(feature = "fastembed")]
mod local {
    use super::Embedder;
    use crate::config::EmbeddingBackendKind;
    use crate::error::EmbedError;
    use async_trait::async_trait;
    use fastembed::{InitOptions, TextEmbedding};
    use std::sync::Arc;

    pub struct FastEmbedder {
        model_id: String,
        model: Arc<TextEmbedding>,
    }

    fn backend_error(details: impl ToString) -> EmbedError {
        EmbedError::Backend {
            backend: EmbeddingBackendKind::FastEmbed.to_string(),
            details: details.to_string(),
        }
    }

    fn short_name(code: &str) -> String {
        let name = code.rsplit('/').next().unwrap_or(code);
        name.trim_end_matches("-onnx").to_ascii_lowercase()
    }

    impl FastEmbedder {
        /// Loads the model whose code matches `model_id`, either exactly or by
        /// its name without the publisher prefix.
        pub fn load(model_id: &str) -> Result<Self, EmbedError> {
            let wanted = short_name(model_id);
            let model = TextEmbedding::list_supported_models()
                .into_iter()
                .find(|info| info.model_code == model_id || short_name(&info.model_code) == wanted)
                .map(|info| info.model)
                .ok_or_else(|| EmbedError::UnsupportedModel {
                    backend: EmbeddingBackendKind::FastEmbed.to_string(),
                    model: model_id.to_string(),
                })?;

            let model = TextEmbedding::try_new(InitOptions::new(model)).map_err(backend_error)?;

            Ok(Self {
                model_id: model_id.to_string(),
                model: Arc::new(model),
            })
        }
    }

    #[async_trait]
    impl Embedder for FastEmbedder {
        fn model_id(&self) -> &str {
            &self.model_id
        }

        /// Inference is CPU-bound and runs on the blocking pool.
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            let model = Arc::clone(&self.model);
            let texts = texts.to_vec();
            tokio::task::spawn_blocking(move || model.embed(texts, None))
                .await
                .map_err(backend_error)?
                .map_err(backend_error)
        }
    }
}

/// Resolves the backend named by `settings`. Network handshakes and model
/// loading happen here, so callers should defer this until first use.
pub async fn build_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>, EmbedError> {
    info!(backend = %settings.backend, model = %settings.model, "loading embedding backend");

    match settings.backend {
        EmbeddingBackendKind::Tei => Ok(Arc::new(
            TeiEmbedder::connect(&settings.endpoint, &settings.model).await?,
        )),
        EmbeddingBackendKind::Ngram => Ok(Arc::new(CharacterNgramEmbedder::from_model_id(
            &settings.model,
        )?)),
        #[cfg(feature = "fastembed")]
        EmbeddingBackendKind::FastEmbed => {
            let model = settings.model.clone();
            let loaded = tokio::task::spawn_blocking(move || FastEmbedder::load(&model))
                .await
                .map_err(|error| EmbedError::Backend {
                    backend: EmbeddingBackendKind::FastEmbed.to_string(),
                    details: error.to_string(),
                })??;
            Ok(Arc::new(loaded))
        }
        #[cfg(not(feature = "fastembed"))]
        EmbeddingBackendKind::FastEmbed => Err(EmbedError::UnsupportedModel {
            backend: "fastembed (built without the `fastembed` feature)".to_string(),
            model: settings.model.clone(),
        }),
    }
}

type EmbedderFuture = Pin<Box<dyn Future<Output = Result<Arc<dyn Embedder>, EmbedError>> + Send>>;
type EmbedderFactory = Box<dyn Fn() -> EmbedderFuture + Send + Sync>;

/// Shared entry point for embeddings. The backend is built on first use and
/// reused for the lifetime of the gateway; concurrent first callers wait for a
/// single construction. A failed construction is not cached.
pub struct EmbeddingGateway {
    factory: EmbedderFactory,
    embedder: OnceCell<Arc<dyn Embedder>>,
}

impl EmbeddingGateway {
    pub fn new(settings: EmbeddingSettings) -> Self {
        let settings = Arc::new(settings);
        Self::with_factory(move || {
            let settings = Arc::clone(&settings);
            async move { build_embedder(&settings).await }
        })
    }

    pub fn with_factory<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn Embedder>, EmbedError>> + Send + 'static,
    {
        Self {
            factory: Box::new(move || Box::pin(factory())),
            embedder: OnceCell::new(),
        }
    }

    pub fn from_embedder(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_factory(move || {
            let embedder = Arc::clone(&embedder);
            async move { Ok(embedder) }
        })
    }

    /// Model identifier of the backend, once it has been initialised.
    pub fn model_id(&self) -> Option<&str> {
        self.embedder.get().map(|embedder| embedder.model_id())
    }

    async fn backend(&self) -> Result<&Arc<dyn Embedder>, EmbedError> {
        self.embedder.get_or_try_init(|| (self.factory)()).await
    }

    /// Embeds `texts` into unit-length vectors, one per text, in order.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let backend = self.backend().await?;
        let mut vectors = backend.embed(texts).await?;

        if vectors.len() != texts.len() {
            return Err(EmbedError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }

        for vector in &mut vectors {
            normalize(vector);
        }

        debug!(model = backend.model_id(), count = vectors.len(), "embedded batch");
        Ok(vectors)
    }
}

fn normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector {
            *value /= magnitude;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedEmbedder {
        vectors: Vec<Vec<f32>>,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn model_id(&self) -> &str {
            "fixed"
        }

        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Ok(self.vectors.clone())
        }
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    fn magnitude(vector: &[f32]) -> f32 {
        vector.iter().map(|value| value * value).sum::<f32>().sqrt()
    }

    #[tokio::test]
    async fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let input = texts(&["Hydraulic pressure and flow"]);
        let first = embedder.embed(&input).await.unwrap();
        let second = embedder.embed(&input).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder::from_model_id("char-trigram-32").unwrap();
        let vectors = embedder.embed(&texts(&["abc", "pump seal"])).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert!(vectors.iter().all(|vector| vector.len() == 32));
        assert!((magnitude(&vectors[1]) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn default_embedder_uses_default_dimensions() {
        let embedder = CharacterNgramEmbedder::default();
        assert_eq!(embedder.model_id(), "char-trigram-128");

        let vectors = embedder.embed(&["relief valve".to_string()]).await.unwrap();
        assert_eq!(vectors[0].len(), DEFAULT_EMBEDDING_DIMENSIONS);
    }

    #[test]
    fn ngram_rejects_foreign_model_ids() {
        for model in ["sentence-transformers/all-MiniLM-L6-v2", "char-trigram-", "char-trigram-0"] {
            assert!(matches!(
                CharacterNgramEmbedder::from_model_id(model),
                Err(EmbedError::UnsupportedModel { .. })
            ));
        }
    }

    #[tokio::test]
    async fn unsupported_model_fails_on_first_use_not_construction() {
        let gateway = EmbeddingGateway::new(EmbeddingSettings {
            backend: EmbeddingBackendKind::Ngram,
            model: "BAAI/bge-small-en-v1.5".to_string(),
            endpoint: String::new(),
        });
        assert!(gateway.model_id().is_none());

        let result = gateway.embed(&texts(&["query"])).await;
        assert!(matches!(result, Err(EmbedError::UnsupportedModel { .. })));
        assert!(gateway.model_id().is_none());
    }

    #[tokio::test]
    async fn gateway_normalizes_backend_vectors() {
        let gateway = EmbeddingGateway::from_embedder(Arc::new(FixedEmbedder {
            vectors: vec![vec![3.0, 4.0]],
        }));

        let vectors = gateway.embed(&texts(&["x"])).await.unwrap();
        assert_eq!(vectors, vec![vec![0.6, 0.8]]);
        assert_eq!(gateway.model_id(), Some("fixed"));
    }

    #[tokio::test]
    async fn gateway_rejects_vector_count_mismatch() {
        let gateway = EmbeddingGateway::from_embedder(Arc::new(FixedEmbedder {
            vectors: vec![vec![1.0, 0.0]],
        }));

        let result = gateway.embed(&texts(&["a", "b"])).await;
        assert!(matches!(
            result,
            Err(EmbedError::CountMismatch { expected: 2, actual: 1 })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_use_builds_backend_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let gateway = Arc::new(EmbeddingGateway::with_factory(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Ok(Arc::new(CharacterNgramEmbedder::default()) as Arc<dyn Embedder>)
            }
        }));

        let mut handles = Vec::new();
        for index in 0..16 {
            let gateway = Arc::clone(&gateway);
            handles.push(tokio::spawn(async move {
                gateway.embed(&[format!("request {index}")]).await
            }));
        }
        for handle in handles {
            let vectors = handle.await.unwrap().unwrap();
            assert_eq!(vectors.len(), 1);
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_construction_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let gateway = EmbeddingGateway::with_factory(move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(EmbedError::Backend {
                        backend: "test".to_string(),
                        details: "model server offline".to_string(),
                    })
                } else {
                    Ok(Arc::new(CharacterNgramEmbedder::default()) as Arc<dyn Embedder>)
                }
            }
        });

        assert!(gateway.embed(&texts(&["a"])).await.is_err());
        assert!(gateway.embed(&texts(&["a"])).await.is_ok());
        assert!(gateway.embed(&texts(&["b"])).await.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
