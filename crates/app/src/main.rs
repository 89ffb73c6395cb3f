mod server;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_index_core::config::{
    DEFAULT_COLLECTION, DEFAULT_EMBED_MODEL, DEFAULT_EMBED_URL, DEFAULT_QDRANT_URL,
};
use pdf_index_core::{
    discover_pdf_files, EmbeddingBackendKind, EmbeddingGateway, EmbeddingSettings, LopdfExtractor,
    QdrantStore, SearchQuery, VectorStoreSettings, DEFAULT_SEARCH_LIMIT,
};
use server::AppState;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-index", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = DEFAULT_QDRANT_URL)]
    qdrant_url: String,

    /// Qdrant collection; must already exist with the embedding dimensionality
    #[arg(long, env = "QDRANT_COLLECTION", default_value = DEFAULT_COLLECTION)]
    qdrant_collection: String,

    /// Qdrant API key
    #[arg(long, env = "QDRANT_API_KEY")]
    qdrant_api_key: Option<String>,

    /// Embedding backend: tei, ngram or fastembed
    #[arg(long, env = "EMBED_BACKEND", default_value = "tei")]
    embed_backend: EmbeddingBackendKind,

    /// Embedding model identifier, interpreted by the backend
    #[arg(long, env = "EMBED_MODEL", default_value = DEFAULT_EMBED_MODEL)]
    embed_model: String,

    /// Embedding server base URL (tei backend)
    #[arg(long, env = "EMBED_URL", default_value = DEFAULT_EMBED_URL)]
    embed_url: String,
}

#[derive(Subcommand)]
enum Command {
    /// Index a PDF, or every PDF below a folder, one document per file.
    Index {
        /// PDF file or folder that contains PDFs recursively.
        #[arg(long)]
        path: PathBuf,
        /// Content type to declare for a single file.
        #[arg(long, default_value = "application/pdf")]
        content_type: String,
    },
    /// Return the chunks nearest to a query.
    Search {
        /// Search query
        #[arg(long)]
        query: String,
        /// Number of hits to return (1-50).
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
    /// Serve the indexing and search endpoints over HTTP.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8000")]
        bind: SocketAddr,
    },
}

impl Cli {
    fn embedding_settings(&self) -> EmbeddingSettings {
        EmbeddingSettings {
            backend: self.embed_backend,
            model: self.embed_model.clone(),
            endpoint: self.embed_url.clone(),
        }
    }

    fn store_settings(&self) -> VectorStoreSettings {
        VectorStoreSettings {
            url: self.qdrant_url.clone(),
            collection: self.qdrant_collection.clone(),
            api_key: self.qdrant_api_key.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let store_settings = cli.store_settings();
    let store = Arc::new(QdrantStore::from_settings(&store_settings)?);
    let embeddings = Arc::new(EmbeddingGateway::new(cli.embedding_settings()));
    let state = Arc::new(AppState::new(
        Arc::new(LopdfExtractor),
        embeddings,
        store,
        &store_settings.collection,
    ));

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        qdrant = %store_settings.url,
        collection = %store_settings.collection,
        embed_backend = %cli.embed_backend,
        embed_model = %cli.embed_model,
        "pdf-index boot"
    );

    match cli.command {
        Command::Index { path, content_type } => index_path(&state, &path, &content_type).await?,
        Command::Search { query, limit } => {
            let result = state
                .search
                .search(&SearchQuery::new(query).with_limit(limit))
                .await?;

            for hit in result.hits {
                let payload = &hit.payload;
                println!(
                    "[{}] score={:.4} page={} chunk={} source={}",
                    hit.id,
                    hit.score,
                    payload.page.map(|page| page.to_string()).unwrap_or_default(),
                    payload.chunk.map(|chunk| chunk.to_string()).unwrap_or_default(),
                    payload.source.as_deref().unwrap_or_default(),
                );
                if let Some(text) = &payload.text {
                    println!("  chunk_text:\n{text}");
                }
            }
        }
        Command::Serve { bind } => {
            let listener = tokio::net::TcpListener::bind(bind)
                .await
                .with_context(|| format!("failed to bind {bind}"))?;
            info!(%bind, "listening");
            axum::serve(listener, server::router(state))
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    Ok(())
}

async fn index_path(state: &AppState, path: &Path, content_type: &str) -> anyhow::Result<()> {
    if !path.is_dir() {
        let report = index_file(state, path, content_type).await?;
        println!(
            "{} chunks indexed for document {} at {}",
            report.chunks_indexed,
            report.document_id,
            Utc::now().to_rfc3339()
        );
        return Ok(());
    }

    let files = discover_pdf_files(path);
    if files.is_empty() {
        anyhow::bail!("no pdf files found in {}", path.display());
    }

    let mut total = 0;
    let mut skipped = 0;
    for file in files {
        match index_file(state, &file, "application/pdf").await {
            Ok(report) => {
                total += report.chunks_indexed;
                println!("{}\t{}\t{}", report.document_id, report.chunks_indexed, file.display());
            }
            Err(error) => {
                skipped += 1;
                warn!(path = %file.display(), reason = %error, "skipped pdf");
            }
        }
    }

    println!(
        "{total} chunks indexed ({skipped} files skipped) at {}",
        Utc::now().to_rfc3339()
    );
    Ok(())
}

async fn index_file(
    state: &AppState,
    path: &Path,
    content_type: &str,
) -> anyhow::Result<pdf_index_core::IndexReport> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("path has no file name: {}", path.display()))?;

    Ok(state
        .indexer
        .index_upload(bytes, filename, content_type)
        .await?)
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for shutdown signal");
    }
}
