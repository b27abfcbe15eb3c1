//! Model provider implementations for Escapist.
//!
//! All providers implement the `escapist_core::Provider` trait.

pub mod anthropic;

pub use anthropic::AnthropicProvider;
