//! Upstream chat-completion client.
//!
//! [`UpstreamClient`] is the single capability the HTTP layer depends on;
//! [`HttpUpstream`] is its reqwest implementation.

mod client;
pub mod sse;
pub mod types;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;

pub use client::HttpUpstream;
pub use sse::fragment_stream;
pub use types::{ChatTurn, CompletionRequest, Role};

/// Lazy, finite, forward-only sequence of text fragments for one request.
///
/// Not restartable: consuming it exhausts the single upstream connection.
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Issues chat-completion calls against the upstream provider.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Non-streaming call; returns the first choice's full message text.
    async fn generate(&self, request: CompletionRequest) -> Result<String>;

    /// Streaming call; errors raised before the first fragment (missing key,
    /// non-success status) are returned directly.
    async fn generate_stream(&self, request: CompletionRequest) -> Result<FragmentStream>;

    /// Whether a credential is available for calls.
    fn api_configured(&self) -> bool;
}
