//! The calling side of a call, and in-process invocation of a service.

use std::time::Instant;

use tokio::sync::oneshot;
use tower::{Service, ServiceExt};
use tracing::debug;

use crate::{
    context::CallContext,
    service::{Incoming, Method, Rpc, ServiceError, ServiceResponse},
    session::{open_session, CallShape, SessionState, StreamSession},
    ProtocolError,
};

/// Terminal outcome of a call: the single response for unary and
/// client-streaming calls, `None` for calls whose responses were streamed.
pub type CallOutcome<Response> = Result<Option<Response>, ProtocolError>;

/// The caller's view of one call.
pub struct CallHandle<Request, Response> {
    session: StreamSession<Request, Response>,
    outcome: oneshot::Receiver<CallOutcome<Response>>,
}

impl<Request, Response> CallHandle<Request, Response> {
    pub(crate) fn new(
        session: StreamSession<Request, Response>,
        outcome: oneshot::Receiver<CallOutcome<Response>>,
    ) -> Self {
        Self { session, outcome }
    }

    pub fn shape(&self) -> CallShape {
        self.session.shape()
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn context(&self) -> &CallContext {
        self.session.context()
    }

    /// Aborts the call. Both sides observe a `Cancelled` outcome.
    pub fn cancel(&self) {
        self.session.context().cancel();
    }

    /// Sends one request of a client-streaming or bidirectional call.
    pub fn send(&mut self, request: Request) -> Result<(), ProtocolError> {
        self.session.send(request)
    }

    /// Signals that no more requests will be sent. Idempotent.
    pub fn close_send(&mut self) {
        self.session.close_send()
    }

    /// Receives the next response of a server-streaming or bidirectional
    /// call, `None` once the server finished the stream.
    pub async fn recv(&mut self) -> Result<Option<Response>, ProtocolError> {
        self.session.recv().await
    }

    /// Closes the request stream and waits for the single response of a
    /// unary or client-streaming call.
    pub async fn response(self) -> Result<Response, ProtocolError> {
        match self.outcome().await? {
            Some(response) => Ok(response),
            None => Err(ProtocolError::internal(
                "call completed without a single response",
            )),
        }
    }

    /// Waits for the terminal status of a call whose responses are streamed.
    pub async fn finish(self) -> Result<(), ProtocolError> {
        self.outcome().await.map(|_| ())
    }

    /// Splits the handle into the caller's session and the pending outcome.
    pub fn into_parts(
        self,
    ) -> (
        StreamSession<Request, Response>,
        oneshot::Receiver<CallOutcome<Response>>,
    ) {
        (self.session, self.outcome)
    }

    async fn outcome(self) -> CallOutcome<Response> {
        let Self {
            mut session,
            outcome,
        } = self;
        session.close_send();
        let context = session.context().clone();
        match context.run(outcome).await? {
            Ok(outcome) => outcome,
            Err(_) => Err(ProtocolError::internal("call ended without an outcome")),
        }
    }
}

/// Invokes `service` in-process, running the call on its own task.
///
/// The request must be present exactly when the method takes a single
/// request. The service future runs under the deadline and cancellation of
/// `context`; if it fails, the failure is delivered to the caller both as the
/// outcome and as the termination of the caller's response stream.
pub fn invoke<P, S>(
    service: S,
    method: P::Method,
    request: Option<P::Request>,
    context: CallContext,
) -> CallHandle<P::Request, P::Response>
where
    P: Rpc,
    S: Service<Incoming<P>, Response = ServiceResponse<P::Response>> + Send + 'static,
    S::Error: Into<ServiceError>,
    S::Future: Send + 'static,
{
    let (caller, server) = open_session(method.shape(), context.clone());
    let (outcome_tx, outcome_rx) = oneshot::channel();
    let mut reporter = server.outbound_handle();
    let incoming = Incoming {
        method,
        request,
        session: server,
    };

    tokio::spawn(async move {
        let started = Instant::now();
        let outcome = run_call(service, incoming, &context).await;
        match &outcome {
            Ok(_) => {
                debug!(method = method.name(), elapsed = ?started.elapsed(), "call completed");
                if let Some(reporter) = reporter.as_mut() {
                    reporter.close();
                }
            }
            Err(e) => {
                debug!(
                    method = method.name(),
                    error_type = ?e.error_type,
                    "call failed: {}", e
                );
                if let Some(reporter) = reporter.as_mut() {
                    reporter.fail(e.clone());
                }
            }
        }
        outcome_tx.send(outcome).ok();
    });

    CallHandle::new(caller, outcome_rx)
}

async fn run_call<P, S>(
    service: S,
    incoming: Incoming<P>,
    context: &CallContext,
) -> CallOutcome<P::Response>
where
    P: Rpc,
    S: Service<Incoming<P>, Response = ServiceResponse<P::Response>>,
    S::Error: Into<ServiceError>,
{
    let method = incoming.method;
    let shape = method.shape();
    if shape.has_single_request() != incoming.request.is_some() {
        return Err(ProtocolError::invalid_argument(format!(
            "{} is a {:?} method, the request does not match",
            method.name(),
            shape
        )));
    }
    debug!(method = method.name(), ?shape, "call started");
    let response = context
        .run(service.oneshot(incoming))
        .await?
        .map_err(|e| {
            let e: ServiceError = e.into();
            ProtocolError::from(e)
        })?;
    match (response, shape.has_single_response()) {
        (ServiceResponse::Single(response), true) => Ok(Some(response)),
        (ServiceResponse::Streamed, false) => Ok(None),
        _ => Err(ProtocolError::internal(format!(
            "{} produced a response that does not match its shape",
            method.name()
        ))),
    }
}
