//! In-memory knowledge store keyed by specialty.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crew_common::{CrewError, Result, Specialty};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::embedding::{Embedder, cosine_similarity};
use crate::retrieval::{chunk_text, format_documents};
use crate::types::{DocumentMetadata, KnowledgeChunk, KnowledgeConfig};

const SUPPORTED_EXTENSIONS: [&str; 2] = ["md", "txt"];

type CacheKey = (Specialty, String, usize);

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeStats {
    pub specialty: Specialty,
    pub chunks: usize,
    pub documents: usize,
    pub path: PathBuf,
}

struct IndexedChunk {
    chunk: KnowledgeChunk,
    embedding: Vec<f32>,
}

/// Embedded chunks per specialty plus a query cache.
pub struct KnowledgeStore {
    config: KnowledgeConfig,
    embedder: Arc<dyn Embedder>,
    chunks: Arc<RwLock<HashMap<Specialty, Vec<IndexedChunk>>>>,
    cache: Arc<RwLock<HashMap<CacheKey, Vec<KnowledgeChunk>>>>,
}

impl KnowledgeStore {
    pub fn new(config: KnowledgeConfig, embedder: Arc<dyn Embedder>) -> Self {
        info!(
            base_path = %config.base_path.display(),
            chunk_size = config.chunk_size,
            embedding_model = %config.embedding_model,
            "Initializing knowledge store"
        );
        Self {
            config,
            embedder,
            chunks: Arc::new(RwLock::new(HashMap::new())),
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Load every supported file under `<base_path>/<specialty>/`.
    ///
    /// A missing directory is an empty knowledge base. Unreadable files are
    /// skipped with a warning. Returns the number of documents loaded.
    pub async fn load_specialty(&self, specialty: Specialty) -> Result<usize> {
        let dir = self.config.specialty_dir(specialty);
        if !tokio::fs::try_exists(&dir).await? {
            debug!(specialty = %specialty, path = %dir.display(), "No knowledge base directory");
            return Ok(0);
        }

        let files = collect_files(&dir).await?;
        let mut loaded = 0;
        for path in files {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    let metadata = DocumentMetadata::from_file_name(specialty, &path);
                    self.add_document(metadata, &content).await?;
                    loaded += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable document");
                }
            }
        }

        info!(specialty = %specialty, documents = loaded, "Loaded knowledge base");
        Ok(loaded)
    }

    /// Load several specialties, returning the total document count.
    pub async fn load_all(&self, specialties: &[Specialty]) -> Result<usize> {
        let mut total = 0;
        for specialty in specialties {
            total += self.load_specialty(*specialty).await?;
        }
        Ok(total)
    }

    /// Chunk, embed and index one document. Returns the number of chunks added.
    pub async fn add_document(&self, metadata: DocumentMetadata, content: &str) -> Result<usize> {
        let specialty = metadata.specialty;
        let pieces = chunk_text(content, self.config.chunk_size, self.config.chunk_overlap);
        let embeddings = self.embedder.embed_documents(pieces.clone()).await?;
        if embeddings.len() != pieces.len() {
            return Err(CrewError::Knowledge(format!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                pieces.len()
            )));
        }
        let added = pieces.len();

        {
            let mut chunks = self.chunks.write().await;
            let entry = chunks.entry(specialty).or_default();
            let offset = entry.len();
            entry.extend(pieces.into_iter().zip(embeddings).enumerate().map(
                |(i, (content, embedding))| IndexedChunk {
                    chunk: KnowledgeChunk {
                        id: format!("{}:{}:{}", specialty, metadata.source_file, offset + i),
                        content,
                        metadata: metadata.clone(),
                    },
                    embedding,
                },
            ));
        }

        self.cache
            .write()
            .await
            .retain(|(cached_specialty, _, _), _| *cached_specialty != specialty);

        debug!(
            specialty = %specialty,
            source_file = %metadata.source_file,
            chunks = added,
            "Indexed document"
        );
        Ok(added)
    }

    /// Top `limit` chunks of `specialty` ranked by cosine similarity to
    /// `query`. Chunks at or below `min_similarity` are left out.
    pub async fn search(
        &self,
        specialty: Specialty,
        query: &str,
        limit: usize,
    ) -> Result<Vec<KnowledgeChunk>> {
        if query.trim().is_empty() {
            return Err(CrewError::Knowledge("query must not be empty".into()));
        }

        let key = (specialty, query.trim().to_lowercase(), limit);
        if self.config.cache_queries {
            if let Some(hit) = self.cache.read().await.get(&key) {
                debug!(specialty = %specialty, query = %query, "Knowledge cache hit");
                return Ok(hit.clone());
            }
        }

        let has_chunks = self
            .chunks
            .read()
            .await
            .get(&specialty)
            .is_some_and(|list| !list.is_empty());
        let results: Vec<KnowledgeChunk> = if has_chunks {
            let query_embedding = self.embedder.embed_query(query.trim()).await?;
            let chunks = self.chunks.read().await;
            let mut scored: Vec<(f32, &KnowledgeChunk)> = chunks
                .get(&specialty)
                .map(|list| {
                    list.iter()
                        .map(|c| (cosine_similarity(&query_embedding, &c.embedding), &c.chunk))
                        .filter(|(s, _)| *s > self.config.min_similarity)
                        .collect()
                })
                .unwrap_or_default();
            scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
            scored.into_iter().take(limit).map(|(_, c)| c.clone()).collect()
        } else {
            Vec::new()
        };

        debug!(
            specialty = %specialty,
            query = %query,
            results = results.len(),
            "Knowledge search"
        );

        if self.config.cache_queries {
            self.cache.write().await.insert(key, results.clone());
        }
        Ok(results)
    }

    /// Search and render the result as an observation string.
    pub async fn lookup(&self, specialty: Specialty, query: &str, limit: usize) -> Result<String> {
        let results = self.search(specialty, query, limit).await?;
        Ok(format_documents(&results))
    }

    pub async fn count(&self, specialty: Specialty) -> usize {
        self.chunks
            .read()
            .await
            .get(&specialty)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub async fn statistics(&self) -> Vec<KnowledgeStats> {
        let chunks = self.chunks.read().await;
        Specialty::ALL
            .iter()
            .filter_map(|specialty| {
                let list = chunks.get(specialty)?;
                let documents: HashSet<&str> = list
                    .iter()
                    .map(|c| c.chunk.metadata.source_file.as_str())
                    .collect();
                Some(KnowledgeStats {
                    specialty: *specialty,
                    chunks: list.len(),
                    documents: documents.len(),
                    path: self.config.specialty_dir(*specialty),
                })
            })
            .collect()
    }
}

/// Supported files below `root`, recursively, in sorted order.
async fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut pending = vec![root.to_path_buf()];
    let mut files = Vec::new();

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() && is_supported(&path) {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}
