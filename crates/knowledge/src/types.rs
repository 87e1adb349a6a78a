//! Knowledge base types and configuration.

use std::path::{Path, PathBuf};

use crew_common::Specialty;
use serde::{Deserialize, Serialize};

/// Provenance of a chunk.
///
/// `year`, `source` and `topic` are filled when the file stem follows the
/// `YEAR_SOURCE_TOPIC` convention, e.g. `2020_ESC_atrial_fibrillation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub specialty: Specialty,
    pub source_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl DocumentMetadata {
    pub fn from_file_name(specialty: Specialty, path: &Path) -> Self {
        let source_file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let parts: Vec<&str> = stem.split('_').collect();
        let follows_convention =
            parts.len() >= 3 && parts[0].chars().all(|c| c.is_ascii_digit()) && !parts[0].is_empty();

        if follows_convention {
            Self {
                specialty,
                source_file,
                year: Some(parts[0].to_string()),
                source: Some(parts[1].to_string()),
                topic: Some(parts[2..].join("_")),
            }
        } else {
            Self {
                specialty,
                source_file,
                year: None,
                source: None,
                topic: None,
            }
        }
    }

    /// `key: value` pairs in a stable order, as shown to the model.
    pub fn describe(&self) -> String {
        let mut parts = vec![
            format!("specialty: {}", self.specialty),
            format!("source_file: {}", self.source_file),
        ];
        if let Some(year) = &self.year {
            parts.push(format!("year: {year}"));
        }
        if let Some(source) = &self.source {
            parts.push(format!("source: {source}"));
        }
        if let Some(topic) = &self.topic {
            parts.push(format!("topic: {topic}"));
        }
        parts.join(", ")
    }
}

/// A retrievable slice of a source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub id: String,
    pub content: String,
    pub metadata: DocumentMetadata,
}

/// Configuration for the knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Root directory holding one sub-directory per specialty
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,

    /// Maximum characters per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_cache_queries")]
    pub cache_queries: bool,

    /// fastembed model used for chunks and queries
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Chunks scoring at or below this cosine similarity are not returned
    #[serde(default)]
    pub min_similarity: f32,
}

fn default_base_path() -> PathBuf {
    PathBuf::from("./knowledge_bases")
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_cache_queries() -> bool {
    true
}

fn default_embedding_model() -> String {
    "multilingual-e5-small".to_string()
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            cache_queries: default_cache_queries(),
            embedding_model: default_embedding_model(),
            min_similarity: 0.0,
        }
    }
}

impl KnowledgeConfig {
    pub fn specialty_dir(&self, specialty: Specialty) -> PathBuf {
        self.base_path.join(specialty.as_str())
    }
}
