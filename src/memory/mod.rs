//! 记忆层：对话明细 + 滚动摘要，以及对话落库

pub mod conversation;
pub mod manager;
pub mod persistence;

pub use conversation::{Message, Role, Turn};
pub use manager::MemoryManager;
pub use persistence::{ConversationSink, JsonlSink, TurnRecord};
