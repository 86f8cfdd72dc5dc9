pub mod conversations;
pub mod embeddings;
pub mod jobs;
pub mod messages;
pub mod settings;
