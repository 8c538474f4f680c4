//! HTTP proxy server module.
//!
//! Accepts chat requests, forwards them to the upstream provider and
//! relays the answer either whole or as server-sent events.

mod handlers;
pub mod messages;
mod server;
pub mod stream;
pub mod types;

pub use messages::{assemble_messages, SYSTEM_PROMPT};
pub use server::{create_router, run_server, AppState, RequestId, REQUEST_ID_HEADER};
pub use stream::{relay, RelayEvent};
pub use types::{ChatRequest, ChatResponse, HistoryEntry};
