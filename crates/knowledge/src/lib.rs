//! Specialty-scoped knowledge base for the consultation crew.
//!
//! Each specialty owns a directory of guideline documents (`.md`/`.txt`).
//! Documents are split into overlapping chunks, embedded with fastembed and
//! held in memory. Queries are ranked by cosine similarity.
//!
//! ```text
//! knowledge_bases/
//! ├── cardiology/
//! │   ├── 2020_ESC_atrial_fibrillation.md
//! │   └── 2023_AHA_heart_failure.txt
//! └── internal_medicine/
//!     └── 2024_KDIGO_ckd.md
//! ```

pub mod embedding;
pub mod retrieval;
pub mod store;
pub mod types;

pub use embedding::{Embedder, EmbeddingService, cosine_similarity};
pub use retrieval::format_documents;
pub use store::{KnowledgeStats, KnowledgeStore};
pub use types::{DocumentMetadata, KnowledgeChunk, KnowledgeConfig};
