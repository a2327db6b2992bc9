//! LLM provider implementations for Carwise.
//!
//! All providers implement the `carwise_core::Provider` trait.
//! `build_from_config` assembles the configured endpoint with retries.

pub mod factory;
pub mod openai_compat;
pub mod retry;

pub use factory::{build_from_config, retry_policy};
pub use openai_compat::OpenAiCompatProvider;
pub use retry::RetryingProvider;
