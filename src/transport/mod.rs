//! Line-delimited JSON-RPC transport for streaming calls.
//!
//! Each connection carries many concurrent calls, identified by the request
//! id that opened them. Stream items travel as notifications named after
//! that id, and the terminal outcome is the JSON-RPC response.

use serde_json::Value;
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::warn;

use crate::{
    error::ProtocolErrorType,
    jsonrpc::JsonRpcMessage,
    service::Rpc,
    ProtocolError,
};

pub mod client;
pub mod server;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed")]
    ConnectionClosed,
    #[error("unknown method {0}")]
    UnknownMethod(String),
    #[error("call id {0} is already in use on this connection")]
    DuplicateCallId(u64),
    #[error("call ids must be unsigned integers")]
    InvalidCallId,
    #[error("missing parameters")]
    MissingParams,
    #[error("server is shutting down")]
    ShuttingDown,
    #[error("client does not support serving requests")]
    ClientRequestUnsupported,
}

impl From<TransportError> for ProtocolError {
    fn from(value: TransportError) -> Self {
        let error_type = match &value {
            TransportError::ConnectionClosed => ProtocolErrorType::Internal,
            TransportError::UnknownMethod(_) => ProtocolErrorType::NotFound,
            TransportError::DuplicateCallId(_) => ProtocolErrorType::InvalidArgument,
            TransportError::InvalidCallId => ProtocolErrorType::InvalidArgument,
            TransportError::MissingParams => ProtocolErrorType::InvalidArgument,
            TransportError::ShuttingDown => ProtocolErrorType::Internal,
            TransportError::ClientRequestUnsupported => ProtocolErrorType::InvalidArgument,
        };
        ProtocolError::new(error_type, Box::new(value))
    }
}

/// Converts the values of an [`Rpc`] to and from their JSON form.
pub trait JsonRpcCodec: Rpc {
    /// Looks up a method by its wire name.
    fn method_from_name(name: &str) -> Option<Self::Method>;

    fn decode_request(method: Self::Method, params: Value)
        -> Result<Self::Request, ProtocolError>;

    fn encode_request(request: &Self::Request) -> Result<Value, ProtocolError>;

    fn decode_response(
        method: Self::Method,
        result: Value,
    ) -> Result<Self::Response, ProtocolError>;

    fn encode_response(response: &Self::Response) -> Result<Value, ProtocolError>;
}

/// Splits the inbound byte stream into lines.
pub(crate) fn line_reader<R: AsyncRead>(reader: R) -> FramedRead<R, LinesCodec> {
    FramedRead::new(reader, LinesCodec::new())
}

/// Parses one inbound line. Malformed lines are logged and dropped.
pub(crate) fn parse_line(line: &str) -> Option<JsonRpcMessage> {
    if line.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(line).and_then(JsonRpcMessage::try_from) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!("dropping malformed json rpc message: {e}");
            None
        }
    }
}

/// Writes one message followed by a newline.
pub(crate) async fn write_message<W>(
    writer: &Mutex<W>,
    message: &JsonRpcMessage,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut serialized = serde_json::to_string(message)?;
    serialized.push('\n');
    let mut writer = writer.lock().await;
    writer.write_all(serialized.as_bytes()).await?;
    writer.flush().await
}
