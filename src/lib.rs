//! Catalog Agent
//!
//! A question-answering agent over a product catalog that:
//! - Retrieves product descriptions by cosine similarity over an in-memory vector index
//! - Lets a generation model call tools (date, sales, product search) in a bounded loop
//! - Keeps per-session conversation history, committed only when a query finishes
//! - Accumulates token usage and emits a filtered trace per query
//! - Audits every completed query
//!
//! LOOP:
//! INPUT → GENERATE → (TOOL CALLS → TOOL RETURNS → GENERATE)* → FINAL → COMMIT

pub mod agent;
pub mod api;
pub mod audit;
pub mod config;
pub mod embedding;
pub mod error;
pub mod execution;
pub mod index;
pub mod llm;
pub mod memory;
pub mod models;
pub mod session;
pub mod tools;

pub use error::{AgentError, Result};

// Re-export common types
pub use agent::{LoopOptions, Orchestrator};
pub use config::AgentConfig;
pub use index::VectorIndex;
pub use models::*;
