use std::{collections::HashMap, sync::Arc, time::Duration};

use futures::StreamExt;
use serde_json::Value;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{
        mpsc::{self, UnboundedReceiver, UnboundedSender},
        oneshot, Mutex,
    },
};
use tokio_util::{
    codec::{FramedRead, LinesCodec},
    sync::CancellationToken,
    task::TaskTracker,
};
use tower::{timeout::Timeout, Service};
use tracing::{debug, error, warn};

use crate::{
    call::{invoke, CallOutcome},
    channel::{MessageReceiver, MessageSender},
    context::CallContext,
    jsonrpc::{
        CancelParams, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
        CANCEL_METHOD,
    },
    service::{Incoming, Method, Rpc, ServiceError, ServiceFuture, ServiceResponse},
    transport::{line_reader, parse_line, write_message, JsonRpcCodec, TransportError},
    util::parse_from_value,
    ProtocolError,
};

struct InflightCall<P: Rpc> {
    method: P::Method,
    requests: Option<MessageSender<P::Request>>,
    context: CallContext,
}

/// One client connection. Demultiplexes inbound messages onto the calls
/// opened on it.
pub(super) struct Connection<P, S, R, W>
where
    P: JsonRpcCodec,
{
    service: Timeout<S>,
    lines: FramedRead<R, LinesCodec>,
    writer: Arc<Mutex<W>>,
    calls: HashMap<u64, InflightCall<P>>,
    finished_tx: UnboundedSender<u64>,
    finished_rx: UnboundedReceiver<u64>,
    tracker: TaskTracker,
    draining: CancellationToken,
    shutdown: CancellationToken,
}

impl<P, S, R, W> Connection<P, S, R, W>
where
    P: JsonRpcCodec,
    S: Service<
            Incoming<P>,
            Response = ServiceResponse<P::Response>,
            Error = ServiceError,
            Future = ServiceFuture<ServiceResponse<P::Response>>,
        > + Clone
        + Send
        + 'static,
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub(super) fn new(
        service: Timeout<S>,
        reader: R,
        writer: W,
        tracker: TaskTracker,
        draining: CancellationToken,
        shutdown: CancellationToken,
    ) -> Self {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        Self {
            service,
            lines: line_reader(reader),
            writer: Arc::new(Mutex::new(writer)),
            calls: HashMap::new(),
            finished_tx,
            finished_rx,
            tracker,
            draining,
            shutdown,
        }
    }

    /// Processes messages until the client disconnects, or until the server
    /// drains and no call is left on this connection.
    pub(super) async fn run(mut self) {
        loop {
            tokio::select! {
                line = self.lines.next() => match line {
                    Some(Ok(line)) => self.handle_line(&line).await,
                    Some(Err(e)) => {
                        error!("connection i/o error: {}", e);
                        break;
                    }
                    None => break,
                },
                Some(id) = self.finished_rx.recv() => {
                    self.calls.remove(&id);
                }
                _ = self.draining.cancelled(), if self.calls.is_empty() => break,
            }
        }
        if !self.calls.is_empty() {
            debug!(
                calls = self.calls.len(),
                "connection closed, cancelling its calls"
            );
        }
        for (_, call) in self.calls.drain() {
            call.context.cancel();
        }
    }

    async fn handle_line(&mut self, line: &str) {
        match parse_line(line) {
            None => (),
            Some(JsonRpcMessage::Request(request)) => self.handle_request(request).await,
            Some(JsonRpcMessage::Notification(notification)) => {
                self.handle_notification(notification)
            }
            Some(JsonRpcMessage::Response(_)) => warn!("ignoring response sent by the client"),
        }
    }

    async fn handle_request(&mut self, request: JsonRpcRequest) {
        let Some(id) = request.id.as_u64() else {
            reply(
                &self.writer,
                Err(TransportError::InvalidCallId.into()),
                request.id,
            )
            .await;
            return;
        };
        if let Err(e) = self.open_call(id, request) {
            debug!(id, "rejected call: {}", e);
            reply(&self.writer, Err(e), id.into()).await;
        }
    }

    fn open_call(&mut self, id: u64, request: JsonRpcRequest) -> Result<(), ProtocolError> {
        if self.draining.is_cancelled() {
            return Err(TransportError::ShuttingDown.into());
        }
        if self.calls.contains_key(&id) {
            return Err(TransportError::DuplicateCallId(id).into());
        }
        let method = P::method_from_name(&request.method)
            .ok_or_else(|| TransportError::UnknownMethod(request.method.clone()))?;
        let call_request = match (method.shape().has_single_request(), request.params) {
            (true, Some(params)) => Some(P::decode_request(method, params)?),
            (true, None) => return Err(TransportError::MissingParams.into()),
            (false, _) => None,
        };
        let context = match request.timeout_ms {
            Some(timeout_ms) => CallContext::with_timeout(Duration::from_millis(timeout_ms)),
            None => CallContext::new(),
        }
        .child_of(&self.shutdown);

        debug!(id, method = method.name(), "opening call");
        let (session, outcome) =
            invoke::<P, _>(self.service.clone(), method, call_request, context.clone())
                .into_parts();
        let (requests, responses, _) = session.into_parts();
        self.calls.insert(
            id,
            InflightCall {
                method,
                requests,
                context,
            },
        );
        self.tracker.spawn(report_call::<P, W>(
            id,
            responses,
            outcome,
            self.writer.clone(),
            self.finished_tx.clone(),
        ));
        Ok(())
    }

    fn handle_notification(&mut self, notification: JsonRpcNotification) {
        if notification.method == CANCEL_METHOD {
            match notification.params.map(parse_from_value::<CancelParams>) {
                Some(Ok(CancelParams { id })) => match self.calls.get(&id) {
                    Some(call) => {
                        debug!(id, "call cancelled by the client");
                        call.context.cancel();
                    }
                    None => debug!(id, "ignoring cancel for a finished call"),
                },
                _ => warn!("ignoring malformed cancel notification"),
            }
            return;
        }

        let Ok(id) = notification.method.parse::<u64>() else {
            warn!("ignoring notification with unknown method {}", notification.method);
            return;
        };
        let Some(call) = self.calls.get_mut(&id) else {
            warn!(id, "ignoring stream message for unknown call");
            return;
        };
        let method = call.method;
        let Some(requests) = call.requests.as_mut() else {
            warn!(id, "ignoring stream message for a call without a request stream");
            return;
        };
        match notification.params {
            None => requests.close(),
            Some(params) => match P::decode_request(method, params) {
                Ok(request) => {
                    if requests.send(request).is_err() {
                        debug!(id, "call no longer reads its request stream");
                    }
                }
                Err(e) => {
                    warn!(id, "invalid stream message: {}", e);
                    requests.fail(e);
                }
            },
        }
    }
}

async fn reply<W>(writer: &Mutex<W>, result: Result<Value, ProtocolError>, id: Value)
where
    W: AsyncWrite + Unpin,
{
    let response: JsonRpcMessage = JsonRpcResponse::new(result, id).into();
    if let Err(e) = write_message(writer, &response).await {
        error!("failed to write response: {}", e);
    }
}

/// Writes the responses of one call as they are produced, then its
/// terminal outcome.
async fn report_call<P, W>(
    id: u64,
    responses: Option<MessageReceiver<P::Response>>,
    outcome: oneshot::Receiver<CallOutcome<P::Response>>,
    writer: Arc<Mutex<W>>,
    finished_tx: UnboundedSender<u64>,
) where
    P: JsonRpcCodec,
    W: AsyncWrite + Unpin,
{
    if let Some(mut responses) = responses {
        while let Ok(Some(response)) = responses.recv().await {
            let item = match P::encode_response(&response) {
                Ok(item) => item,
                Err(e) => {
                    error!(id, "failed to encode stream item: {}", e);
                    break;
                }
            };
            let notification: JsonRpcMessage =
                JsonRpcNotification::stream_item(id, item).into();
            if let Err(e) = write_message(&writer, &notification).await {
                debug!(id, "failed to write stream item: {}", e);
            }
        }
    }

    let result = match outcome.await {
        Ok(outcome) => outcome.and_then(|response| match response {
            Some(response) => P::encode_response(&response),
            None => Ok(Value::Null),
        }),
        Err(_) => Err(ProtocolError::internal("call ended without an outcome")),
    };
    let response: JsonRpcMessage = JsonRpcResponse::new(result, id.into()).into();
    if let Err(e) = write_message(&writer, &response).await {
        debug!(id, "failed to write call outcome: {}", e);
    }
    finished_tx.send(id).ok();
}
