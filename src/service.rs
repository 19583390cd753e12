use std::{error::Error, fmt::Debug, pin::Pin};

use futures::Future;

use crate::session::{CallShape, StreamSession};

/// Identifies one remote procedure and its interaction shape.
pub trait Method: Copy + Debug + Send + Sync + 'static {
    /// The name used for the method on the wire.
    fn name(self) -> &'static str;

    fn shape(self) -> CallShape;
}

/// Ties together the method, request and response types of a service.
pub trait Rpc: Send + Sync + 'static {
    type Method: Method;
    type Request: Debug + Send + 'static;
    type Response: Debug + Send + 'static;
}

/// A call as seen by the serving side.
///
/// `request` is present exactly when the method takes a single request
/// (unary and server-streaming). Streamed requests are read from `session`,
/// and streamed responses are written to it.
pub struct Incoming<P: Rpc> {
    pub method: P::Method,
    pub request: Option<P::Request>,
    pub session: StreamSession<P::Response, P::Request>,
}

/// What a service produced for a call.
#[derive(Debug)]
pub enum ServiceResponse<Response> {
    /// The single response of a unary or client-streaming call.
    Single(Response),
    /// The responses were sent through the session, which is now closed.
    Streamed,
}

pub type ServiceError = Box<dyn Error + Send + Sync + 'static>;
pub type ServiceFuture<Response> =
    Pin<Box<dyn Future<Output = Result<Response, ServiceError>> + Send>>;
