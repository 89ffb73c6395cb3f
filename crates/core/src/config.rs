use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_EMBED_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_EMBED_URL: &str = "http://localhost:8080";
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6333";
pub const DEFAULT_COLLECTION: &str = "documents";

/// Which implementation serves embeddings. The model identifier is
/// interpreted by the selected backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackendKind {
    /// Remote text-embeddings-inference server.
    #[default]
    Tei,
    /// In-process character trigram hashing.
    Ngram,
    /// In-process ONNX model, requires the `fastembed` feature.
    FastEmbed,
}

impl fmt::Display for EmbeddingBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tei => "tei",
            Self::Ngram => "ngram",
            Self::FastEmbed => "fastembed",
        };
        f.write_str(name)
    }
}

impl FromStr for EmbeddingBackendKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tei" => Ok(Self::Tei),
            "ngram" => Ok(Self::Ngram),
            "fastembed" => Ok(Self::FastEmbed),
            other => Err(format!(
                "unknown embedding backend '{other}' (expected tei, ngram or fastembed)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackendKind,
    pub model: String,
    /// Base URL of the embedding server, only used by remote backends.
    pub endpoint: String,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackendKind::default(),
            model: DEFAULT_EMBED_MODEL.to_string(),
            endpoint: DEFAULT_EMBED_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorStoreSettings {
    pub url: String,
    pub collection: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_QDRANT_URL.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            api_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_parses_case_insensitively() {
        assert_eq!("TEI".parse::<EmbeddingBackendKind>(), Ok(EmbeddingBackendKind::Tei));
        assert_eq!(
            " fastembed ".parse::<EmbeddingBackendKind>(),
            Ok(EmbeddingBackendKind::FastEmbed)
        );
        assert!("onnx".parse::<EmbeddingBackendKind>().is_err());
    }

    #[test]
    fn backend_kind_display_round_trips() {
        for kind in [
            EmbeddingBackendKind::Tei,
            EmbeddingBackendKind::Ngram,
            EmbeddingBackendKind::FastEmbed,
        ] {
            assert_eq!(kind.to_string().parse::<EmbeddingBackendKind>(), Ok(kind));
        }
    }

    #[test]
    fn defaults_point_at_local_services() {
        let embedding = EmbeddingSettings::default();
        assert_eq!(embedding.model, DEFAULT_EMBED_MODEL);
        assert_eq!(embedding.backend, EmbeddingBackendKind::Tei);

        let store = VectorStoreSettings::default();
        assert_eq!(store.collection, "documents");
        assert!(store.api_key.is_none());
    }
}
