//! Conversation memory
//!
//! Ordered message history plus the sliding-window policy that bounds it.

pub mod context_manager;
pub mod store;

pub use context_manager::HistoryPolicy;
pub use store::ConversationState;
