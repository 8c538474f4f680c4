//! chatrelay - streaming proxy for OpenAI-compatible chat completion providers
//!
//! This library provides the core functionality for the chatrelay server:
//! configuration, the upstream client, and the HTTP/SSE relay.

pub mod config;
pub mod error;
pub mod proxy;
pub mod upstream;

pub use config::Config;
pub use error::{Error, Result};
