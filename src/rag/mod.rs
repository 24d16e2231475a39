//! Site index and retrieval.
//!
//! - `normalizer`: raw pages to titled chunks
//! - `store` / `sqlite`: namespaced vector storage
//! - `index`: build-once index lifecycle and the read handle
//! - `pipeline`: similarity search followed by reranking

mod index;
pub mod normalizer;
mod pipeline;
mod sqlite;
mod store;

pub use index::{BuildStats, IndexHandle, IndexManager, RetrievedPassage};
pub use normalizer::{ContentNormalizer, DocumentChunk};
pub use pipeline::RetrievalPipeline;
pub use sqlite::SqliteVectorStore;
pub use store::{DistanceMetric, NamespaceInfo, ScoredRecord, VectorRecord, VectorStore};
