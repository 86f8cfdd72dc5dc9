//! Pluggable embedding backend for the `generate_embedding` job queue.

pub mod embedder;

pub use embedder::{Embedder, OpenAiCompatibleEmbedder};
