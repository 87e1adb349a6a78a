//! Embedding generation for similarity search using fastembed.
//!
//! The default model is multilingual-e5-small (384 dimensions), which
//! handles the Spanish and English guideline text the knowledge bases hold.

use std::sync::Arc;

use async_trait::async_trait;
use crew_common::{CrewError, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use once_cell::sync::OnceCell;
use tokio::task;
use tracing::{debug, info, instrument};

/// Turns text into vectors comparable by cosine similarity.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed document chunks, one vector per input, in input order.
    async fn embed_documents(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Embed a search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// fastembed-backed [`Embedder`] with a lazily loaded model.
///
/// The model is downloaded and initialized on the first embedding call and
/// shared by every later call.
pub struct EmbeddingService {
    model_name: EmbeddingModel,
    model: OnceCell<Arc<TextEmbedding>>,
}

impl EmbeddingService {
    pub fn new(model_name: EmbeddingModel) -> Self {
        Self {
            model_name,
            model: OnceCell::new(),
        }
    }

    /// Build the service from a configured model name.
    pub fn from_model_str(model_name: &str) -> Result<Self> {
        let model = match model_name {
            "multilingual-e5-small" | "MultilingualE5Small" => EmbeddingModel::MultilingualE5Small,
            "multilingual-e5-base" | "MultilingualE5Base" => EmbeddingModel::MultilingualE5Base,
            "multilingual-e5-large" | "MultilingualE5Large" => EmbeddingModel::MultilingualE5Large,
            "paraphrase-multilingual-minilm-l12-v2" | "ParaphraseMLMiniLML12V2" => {
                EmbeddingModel::ParaphraseMLMiniLML12V2
            }
            "all-MiniLM-L6-v2" | "AllMiniLML6V2" => EmbeddingModel::AllMiniLML6V2,
            "bge-small-en-v1.5" | "BGESmallENV15" => EmbeddingModel::BGESmallENV15,
            "bge-base-en-v1.5" | "BGEBaseENV15" => EmbeddingModel::BGEBaseENV15,
            _ => {
                return Err(CrewError::Config(format!(
                    "Unknown embedding model: '{model_name}'. Supported models: \
                     multilingual-e5-small, multilingual-e5-base, multilingual-e5-large, \
                     paraphrase-multilingual-minilm-l12-v2, all-MiniLM-L6-v2, \
                     bge-small-en-v1.5, bge-base-en-v1.5"
                )));
            }
        };
        Ok(Self::new(model))
    }

    /// E5 models are trained with `query: ` / `passage: ` prefixes.
    fn uses_e5_prefixes(&self) -> bool {
        matches!(
            self.model_name,
            EmbeddingModel::MultilingualE5Small
                | EmbeddingModel::MultilingualE5Base
                | EmbeddingModel::MultilingualE5Large
        )
    }

    #[instrument(skip(self))]
    fn get_or_init_model(&self) -> Result<Arc<TextEmbedding>> {
        self.model
            .get_or_try_init(|| {
                info!(model = ?self.model_name, "Initializing embedding model");

                let mut options = InitOptions::new(self.model_name.clone());
                options.show_download_progress = false;
                let model = TextEmbedding::try_new(options).map_err(|e| {
                    CrewError::Knowledge(format!("Failed to initialize embedding model: {e}"))
                })?;

                info!(model = ?self.model_name, "Embedding model initialized");
                Ok(Arc::new(model))
            })
            .cloned()
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.get_or_init_model()?;
        let batch_size = texts.len();

        // fastembed is synchronous
        let embeddings = task::spawn_blocking(move || model.embed(texts, None))
            .await
            .map_err(|e| CrewError::Knowledge(format!("Embedding task failed: {e}")))?
            .map_err(|e| CrewError::Knowledge(format!("Failed to generate embeddings: {e}")))?;

        debug!(
            batch_size,
            dimension = embeddings.first().map(Vec::len).unwrap_or(0),
            "Generated embeddings"
        );
        Ok(embeddings)
    }
}

impl Default for EmbeddingService {
    fn default() -> Self {
        Self::new(EmbeddingModel::MultilingualE5Small)
    }
}

#[async_trait]
impl Embedder for EmbeddingService {
    async fn embed_documents(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let texts = if self.uses_e5_prefixes() {
            texts.into_iter().map(|t| format!("passage: {t}")).collect()
        } else {
            texts
        };
        self.embed(texts).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let text = if self.uses_e5_prefixes() {
            format!("query: {text}")
        } else {
            text.to_string()
        };
        self.embed(vec![text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CrewError::Knowledge("Empty embedding result".into()))
    }
}

/// Cosine similarity, 0.0 when either vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
