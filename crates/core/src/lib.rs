//! # Escapist Core
//!
//! Domain types, traits, and error definitions for the Escapist trip planner.
//!
//! Every collaborator the agents talk to is expressed as a trait here:
//! the language model ([`Provider`]), callable tools ([`Tool`]) and the
//! response cache ([`CacheStore`]). Implementations live in their own crates,
//! so tests can swap any of them for a scripted stand-in.

pub mod cache;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use cache::{CacheEntry, CacheStore};
pub use error::{CacheError, Error, ProviderError, Result, ToolError};
pub use message::{Conversation, ConversationId, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
