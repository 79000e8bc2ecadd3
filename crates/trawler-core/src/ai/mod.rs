//! Provider-facing types and the completion transport interface.

pub mod transport;
pub mod types;

pub use transport::{
    Completion, CompletionRequest, CompletionTransport, ContextParameters, SessionCacheMode,
    StreamPart,
};
pub use types::{ChatMessage, ChatParameters, FinishReason, Role, ToolCall, ToolSpec, Usage};
