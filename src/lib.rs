//! Streaming remote procedure calls over line-delimited JSON-RPC.
//!
//! A call has one of four shapes (unary, server-streaming, client-streaming
//! or bidirectional). Both ends of a call share a [`context::CallContext`]
//! carrying its deadline and cancellation, and exchange messages through a
//! [`session::StreamSession`]. Services are [`tower::Service`]s over
//! [`service::Incoming`] calls and can be invoked in-process with
//! [`call::invoke`] or served to remote clients with
//! [`transport::server::Server`].

pub mod aggregate;
pub mod blog;
pub mod call;
pub mod channel;
pub mod context;
pub mod error;
pub mod greet;
pub mod handler;
pub mod jsonrpc;
pub mod service;
pub mod session;
pub mod transport;
pub mod util;

pub use error::{ProtocolError, ProtocolErrorType};
pub use service::{ServiceError, ServiceFuture, ServiceResponse};
pub use tower;

const DEFAULT_TIMEOUT_SECS: u64 = 900;

/// Implemented by configuration structs, documenting their options as a
/// commented TOML snippet.
pub trait ConfigExampleSnippet {
    fn config_example_snippet() -> String;
}
