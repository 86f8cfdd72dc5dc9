pub mod conversation;
pub mod embedding;
pub mod job;
pub mod message;
pub mod setting;

pub use conversation::{Conversation, ConversationStats, NewConversation, Source};
pub use embedding::{EmbeddingCoverage, MessageEmbedding, VectorMatch};
pub use job::{GenerateEmbeddingPayload, Job, JobStatus, QueueStats, GENERATE_EMBEDDING};
pub use message::{Attachment, Message, MessageMetadata, MessageStats, NewMessage, Role};
pub use setting::Setting;
