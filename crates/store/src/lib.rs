//! Conversation Store (C4): thread-safe transcript plus reserved-key side
//! store, and the context-assembly logic C7 uses to build LLM requests.

pub mod context;
pub mod conversation;
pub mod truncation;

pub use context::{ContextCaps, FileAnalysis};
pub use conversation::{ConversationStore, Key, ReservedKey, RESERVED_KEY_NAMES};
