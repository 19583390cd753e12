//! One end of a logical call.
//!
//! [`open_session`] allocates the channels a call shape needs and returns the
//! caller's end and the server's end. Each end owns the sending half of one
//! direction and the receiving half of the other, and tracks its own
//! open/half-closed/closed state.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    channel::{message_channel, MessageReceiver, MessageSender},
    context::CallContext,
    ProtocolError,
};

/// The four interaction shapes of a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallShape {
    /// One request, one response.
    Unary,
    /// One request, many responses.
    ServerStreaming,
    /// Many requests, one response.
    ClientStreaming,
    /// Independent request and response sequences.
    Bidirectional,
}

impl CallShape {
    /// Whether the call is opened with a single request value.
    pub fn has_single_request(self) -> bool {
        matches!(self, CallShape::Unary | CallShape::ServerStreaming)
    }

    /// Whether the call terminates with a single response value.
    pub fn has_single_response(self) -> bool {
        matches!(self, CallShape::Unary | CallShape::ClientStreaming)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Open,
    /// This end will send nothing more.
    HalfClosedLocal,
    /// The peer will send nothing more.
    HalfClosedRemote,
    Closed,
}

/// One end of a call: sends `Out` messages and receives `In` messages.
pub struct StreamSession<Out, In> {
    shape: CallShape,
    state: SessionState,
    outbound: Option<MessageSender<Out>>,
    inbound: Option<MessageReceiver<In>>,
    context: CallContext,
    error: Option<ProtocolError>,
}

/// Opens the two ends of a call of the given shape.
///
/// Unary calls allocate no channel, server-streaming calls only the
/// server-to-caller channel, client-streaming calls only the caller-to-server
/// channel and bidirectional calls both.
pub fn open_session<Req, Resp>(
    shape: CallShape,
    context: CallContext,
) -> (StreamSession<Req, Resp>, StreamSession<Resp, Req>) {
    let (requests_tx, requests_rx) = match shape {
        CallShape::ClientStreaming | CallShape::Bidirectional => {
            let (tx, rx) = message_channel();
            (Some(tx), Some(rx))
        }
        _ => (None, None),
    };
    let (responses_tx, responses_rx) = match shape {
        CallShape::ServerStreaming | CallShape::Bidirectional => {
            let (tx, rx) = message_channel();
            (Some(tx), Some(rx))
        }
        _ => (None, None),
    };
    (
        StreamSession::new(shape, requests_tx, responses_rx, context.clone()),
        StreamSession::new(shape, responses_tx, requests_rx, context),
    )
}

impl<Out, In> StreamSession<Out, In> {
    fn new(
        shape: CallShape,
        outbound: Option<MessageSender<Out>>,
        inbound: Option<MessageReceiver<In>>,
        context: CallContext,
    ) -> Self {
        let state = match (outbound.is_some(), inbound.is_some()) {
            (true, true) => SessionState::Open,
            (false, true) => SessionState::HalfClosedLocal,
            (true, false) => SessionState::HalfClosedRemote,
            (false, false) => SessionState::Closed,
        };
        Self {
            shape,
            state,
            outbound,
            inbound,
            context,
            error: None,
        }
    }

    pub fn shape(&self) -> CallShape {
        self.shape
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn context(&self) -> &CallContext {
        &self.context
    }

    /// The error the session was closed with, if any.
    pub fn error(&self) -> Option<&ProtocolError> {
        self.error.as_ref()
    }

    /// Sends a message to the peer without waiting for it to be consumed.
    pub fn send(&mut self, message: Out) -> Result<(), ProtocolError> {
        if matches!(
            self.state,
            SessionState::HalfClosedLocal | SessionState::Closed
        ) {
            return Err(self.closed_error("send"));
        }
        if let Err(e) = self.context.check() {
            self.fail(e.clone());
            return Err(e);
        }
        let result = match &self.outbound {
            Some(outbound) => outbound.send(message),
            None => Err(self.closed_error("send")),
        };
        if let Err(e) = &result {
            self.fail(e.clone());
        }
        result
    }

    /// Waits for the next message from the peer.
    ///
    /// Returns `Ok(None)` once the peer closed its sending direction. The
    /// wait is interrupted by the call's deadline or cancellation.
    pub async fn recv(&mut self) -> Result<Option<In>, ProtocolError> {
        match self.state {
            SessionState::Closed => return Err(self.closed_error("receive")),
            SessionState::HalfClosedRemote => return Ok(None),
            _ => (),
        }
        let result = match self.inbound.as_mut() {
            Some(inbound) => self.context.run(inbound.recv()).await,
            None => return Ok(None),
        };
        match result {
            Ok(Ok(Some(message))) => Ok(Some(message)),
            Ok(Ok(None)) => {
                self.inbound = None;
                self.transition_remote_closed();
                Ok(None)
            }
            Ok(Err(e)) | Err(e) => {
                self.fail(e.clone());
                Err(e)
            }
        }
    }

    /// Closes the sending direction. Closing an already closed direction is
    /// a no-op.
    pub fn close_send(&mut self) {
        if let Some(mut outbound) = self.outbound.take() {
            outbound.close();
            self.state = match self.state {
                SessionState::Open => SessionState::HalfClosedLocal,
                _ => SessionState::Closed,
            };
            debug!(shape = ?self.shape, state = ?self.state, "closed send direction");
        }
    }

    /// Closes the session with `error`, which the peer observes as the
    /// termination of its inbound stream.
    pub fn fail(&mut self, error: ProtocolError) {
        if self.state == SessionState::Closed && self.error.is_some() {
            return;
        }
        if let Some(mut outbound) = self.outbound.take() {
            outbound.fail(error.clone());
        }
        self.inbound = None;
        self.state = SessionState::Closed;
        debug!(shape = ?self.shape, "session failed: {}", error);
        self.error = Some(error);
    }

    /// A second handle on the sending direction, used by the invoker to
    /// report the handler's terminal outcome to the peer.
    pub(crate) fn outbound_handle(&self) -> Option<MessageSender<Out>> {
        self.outbound.clone()
    }

    /// Splits the session into its raw channel halves.
    pub fn into_parts(
        self,
    ) -> (
        Option<MessageSender<Out>>,
        Option<MessageReceiver<In>>,
        CallContext,
    ) {
        (self.outbound, self.inbound, self.context)
    }

    fn transition_remote_closed(&mut self) {
        self.state = match self.state {
            SessionState::Open => SessionState::HalfClosedRemote,
            _ => SessionState::Closed,
        };
        debug!(shape = ?self.shape, state = ?self.state, "peer closed its send direction");
    }

    fn closed_error(&self, operation: &str) -> ProtocolError {
        match &self.error {
            Some(e) => e.clone(),
            None => ProtocolError::internal(format!("{operation} on a closed stream")),
        }
    }
}
