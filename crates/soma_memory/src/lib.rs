pub mod buffer;
pub mod embedding;
pub mod linear;
pub mod pipeline;
pub mod profile;
pub mod sqlite;
pub mod store;

pub use buffer::{ConsolidationQueue, Role, ShortTermBuffer, Turn};
pub use embedding::{cosine_similarity, Embedder, FastEmbedder};
pub use linear::LinearStore;
pub use pipeline::{MemoryPipeline, MemoryStats, MemorySystem, Summarizer};
pub use profile::ProfileStore;
pub use sqlite::SqliteStore;
pub use store::{LongTermStore, MemoryMatch, MemoryMetadata, MemoryRecord, StoreStats};
