//! HTTP client for the analytics server.
//!
//! - `sse`: chat stream codec (SSE records to `StreamEvent`s)
//! - `transport`: request/response plumbing for chat, clear and export
//! - `types`: request and response bodies

mod error;
pub mod sse;
pub mod transport;
pub mod types;

pub use error::{ClientError, ClientErrorKind, ClientResult};
pub use transport::{CONVERSATION_ID_HEADER, ChatClient, ChatEventStream, ChatStream};
pub use types::{ChatRequest, DeckPreview, ExportRequest, ExportedDeck, SlidePreview};
