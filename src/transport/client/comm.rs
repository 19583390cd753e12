use std::collections::HashMap;

use futures::StreamExt;
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
};
use tracing::{debug, error, warn};

use crate::{
    call::CallOutcome,
    channel::{MessageReceiver, MessageSender},
    context::CallContext,
    jsonrpc::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse},
    service::{Method, Rpc},
    transport::{line_reader, parse_line, write_message, JsonRpcCodec, TransportError},
    ProtocolError,
};

use super::ClientCallTrx;

/// State kept for a call until its terminal response arrives.
struct ClientCallLink<P: Rpc> {
    method: P::Method,
    responses: Option<MessageSender<P::Response>>,
    outcome_tx: oneshot::Sender<CallOutcome<P::Response>>,
    done: CancellationToken,
}

impl<P: Rpc> ClientCallLink<P> {
    fn complete(mut self, outcome: CallOutcome<P::Response>) {
        self.done.cancel();
        if let Some(responses) = self.responses.as_mut() {
            match &outcome {
                Ok(_) => responses.close(),
                Err(e) => responses.fail(e.clone()),
            }
        }
        self.outcome_tx.send(outcome).ok();
    }
}

pub(super) struct ClientCommTask<P, R, W>
where
    P: JsonRpcCodec,
{
    lines: FramedRead<R, LinesCodec>,
    writer: Mutex<W>,
    links: HashMap<u64, ClientCallLink<P>>,
    to_comm_rx: UnboundedReceiver<ClientCallTrx<P>>,
    outgoing_tx: UnboundedSender<JsonRpcMessage>,
    outgoing_rx: UnboundedReceiver<JsonRpcMessage>,
    last_req_id: u64,
}

impl<P, R, W> ClientCommTask<P, R, W>
where
    P: JsonRpcCodec,
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Returns the task and the sender used to hand it new calls.
    pub(super) fn new(reader: R, writer: W) -> (Self, UnboundedSender<ClientCallTrx<P>>) {
        let (to_comm_tx, to_comm_rx) = mpsc::unbounded_channel();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let task = Self {
            lines: line_reader(reader),
            writer: Mutex::new(writer),
            links: HashMap::new(),
            to_comm_rx,
            outgoing_tx,
            outgoing_rx,
            last_req_id: 0,
        };
        (task, to_comm_tx)
    }

    async fn output_message(&mut self, message: JsonRpcMessage) {
        if let Err(e) = write_message(&self.writer, &message).await {
            error!("failed to write message to server: {}", e);
        }
    }

    async fn handle_outgoing_call(&mut self, trx: ClientCallTrx<P>) {
        let ClientCallTrx {
            method,
            request,
            session,
            outcome_tx,
        } = trx;
        let params = match request.as_ref().map(P::encode_request).transpose() {
            Ok(params) => params,
            Err(e) => {
                outcome_tx.send(Err(e)).ok();
                return;
            }
        };

        let id = self.last_req_id + 1;
        self.last_req_id = id;

        let (responses, requests, context) = session.into_parts();
        let mut jsonrpc_request = JsonRpcRequest::new(method.name().to_string(), params);
        jsonrpc_request.id = id.into();
        jsonrpc_request.timeout_ms = context
            .remaining()
            .map(|remaining| u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX));

        let done = CancellationToken::new();
        self.links.insert(
            id,
            ClientCallLink {
                method,
                responses,
                outcome_tx,
                done: done.clone(),
            },
        );
        debug!(id, method = method.name(), "opening call");
        self.output_message(jsonrpc_request.into()).await;
        tokio::spawn(forward_requests::<P>(
            id,
            requests,
            context,
            done,
            self.outgoing_tx.clone(),
        ));
    }

    async fn handle_incoming_request(&mut self, request: JsonRpcRequest) {
        self.output_message(
            JsonRpcResponse::new(
                Err(TransportError::ClientRequestUnsupported.into()),
                request.id,
            )
            .into(),
        )
        .await
    }

    fn handle_response(&mut self, response: JsonRpcResponse) {
        let Some(link) = response.id.as_u64().and_then(|id| self.links.remove(&id)) else {
            warn!("received response with unknown id, ignoring {:?}", response);
            return;
        };
        let outcome = match response.get_result() {
            Err(e) => Err(e.into()),
            Ok(result) => match link.method.shape().has_single_response() {
                true => P::decode_response(link.method, result).map(Some),
                false => Ok(None),
            },
        };
        link.complete(outcome);
    }

    fn handle_notification(&mut self, notification: JsonRpcNotification) {
        let Some(link) = notification
            .method
            .parse::<u64>()
            .ok()
            .and_then(|id| self.links.get_mut(&id))
        else {
            warn!(
                "received notification for unknown call {}, ignoring",
                notification.method
            );
            return;
        };
        let method = link.method;
        let Some(responses) = link.responses.as_mut() else {
            warn!("received stream item for a call without a response stream, ignoring");
            return;
        };
        match notification.params {
            Some(params) => match P::decode_response(method, params) {
                Ok(response) => {
                    responses.send(response).ok();
                }
                Err(e) => responses.fail(e),
            },
            None => responses.close(),
        }
    }

    fn fail_all(&mut self, error: ProtocolError) {
        if !self.links.is_empty() {
            debug!(calls = self.links.len(), "failing open calls: {}", error);
        }
        for (_, link) in self.links.drain() {
            link.complete(Err(error.clone()));
        }
    }

    async fn run(mut self) {
        let mut client_dropped = false;
        loop {
            tokio::select! {
                trx = self.to_comm_rx.recv(), if !client_dropped => match trx {
                    Some(trx) => self.handle_outgoing_call(trx).await,
                    None => client_dropped = true,
                },
                Some(message) = self.outgoing_rx.recv() => self.output_message(message).await,
                line = self.lines.next() => match line {
                    Some(Ok(line)) => match parse_line(&line) {
                        None => (),
                        Some(JsonRpcMessage::Request(request)) => {
                            self.handle_incoming_request(request).await
                        }
                        Some(JsonRpcMessage::Response(response)) => self.handle_response(response),
                        Some(JsonRpcMessage::Notification(notification)) => {
                            self.handle_notification(notification)
                        }
                    },
                    Some(Err(e)) => {
                        error!("i/o error reading from server: {}", e);
                        break;
                    }
                    None => break,
                },
            }
            if client_dropped && self.links.is_empty() {
                return;
            }
        }
        self.fail_all(TransportError::ConnectionClosed.into());
    }

    pub(super) fn start(self) {
        tokio::spawn(async move {
            self.run().await;
        });
    }
}

/// Forwards the caller's request stream of call `id` to the server, and the
/// caller's cancellation as a cancel notification.
async fn forward_requests<P: JsonRpcCodec>(
    id: u64,
    requests: Option<MessageReceiver<P::Request>>,
    context: CallContext,
    done: CancellationToken,
    outgoing_tx: UnboundedSender<JsonRpcMessage>,
) {
    if let Some(mut requests) = requests {
        loop {
            tokio::select! {
                _ = done.cancelled() => return,
                _ = context.cancelled() => break,
                request = requests.recv() => match request {
                    Ok(Some(request)) => match P::encode_request(&request) {
                        Ok(item) => {
                            outgoing_tx
                                .send(JsonRpcNotification::stream_item(id, item).into())
                                .ok();
                        }
                        Err(e) => {
                            error!(id, "failed to encode stream message: {}", e);
                            break;
                        }
                    },
                    Ok(None) => {
                        outgoing_tx.send(JsonRpcNotification::stream_end(id).into()).ok();
                        tokio::select! {
                            _ = done.cancelled() => return,
                            _ = context.cancelled() => break,
                        }
                    }
                    // the caller gave up on the call
                    Err(_) => break,
                },
            }
        }
    } else {
        tokio::select! {
            _ = done.cancelled() => return,
            _ = context.cancelled() => (),
        }
    }
    debug!(id, "cancelling call on the server");
    outgoing_tx.send(JsonRpcNotification::cancel(id).into()).ok();
}
