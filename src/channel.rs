//! Ordered, unbounded, point-to-point message conduit.
//!
//! A channel carries the messages of one direction of one call. Sending
//! never waits for the consumer. Receiving suspends until a message arrives
//! or the stream terminates, and a clean close is reported differently from
//! an error termination.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::ProtocolError;

enum Frame<T> {
    Message(T),
    End,
    Error(ProtocolError),
}

enum Termination {
    End,
    Error(ProtocolError),
}

/// Creates a new message channel.
pub fn message_channel<T>() -> (MessageSender<T>, MessageReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MessageSender { tx: Some(tx) },
        MessageReceiver {
            rx,
            termination: None,
        },
    )
}

/// Sending half of a message channel. Clones share the underlying queue, so
/// a close issued through any clone terminates the stream for the receiver.
pub struct MessageSender<T> {
    tx: Option<UnboundedSender<Frame<T>>>,
}

impl<T> Clone for MessageSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> MessageSender<T> {
    /// Enqueues `message` for the receiving side. The sender gives up
    /// ownership of the message.
    pub fn send(&self, message: T) -> Result<(), ProtocolError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| ProtocolError::internal("send on a closed stream"))?;
        tx.send(Frame::Message(message))
            .map_err(|_| ProtocolError::internal("stream receiver dropped"))
    }

    /// Marks that no further sends will occur. Idempotent.
    pub fn close(&mut self) {
        if let Some(tx) = self.tx.take() {
            tx.send(Frame::End).ok();
        }
    }

    /// Terminates the stream with an error instead of a clean end.
    /// Has no effect if this sender was already closed.
    pub fn fail(&mut self, error: ProtocolError) {
        if let Some(tx) = self.tx.take() {
            tx.send(Frame::Error(error)).ok();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().map(|tx| tx.is_closed()).unwrap_or(true)
    }
}

/// Receiving half of a message channel.
pub struct MessageReceiver<T> {
    rx: UnboundedReceiver<Frame<T>>,
    termination: Option<Termination>,
}

impl<T> MessageReceiver<T> {
    /// Waits for the next message in send order.
    ///
    /// Returns `Ok(None)` once the stream was closed cleanly and the error
    /// that terminated it otherwise. Both are sticky: later calls return the
    /// same outcome.
    pub async fn recv(&mut self) -> Result<Option<T>, ProtocolError> {
        match &self.termination {
            Some(Termination::End) => return Ok(None),
            Some(Termination::Error(e)) => return Err(e.clone()),
            None => (),
        }
        match self.rx.recv().await {
            Some(Frame::Message(message)) => Ok(Some(message)),
            Some(Frame::End) => {
                self.termination = Some(Termination::End);
                self.rx.close();
                Ok(None)
            }
            Some(Frame::Error(e)) => self.terminate(e),
            None => self.terminate(ProtocolError::internal(
                "stream senders dropped without closing",
            )),
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.termination.is_some()
    }

    fn terminate<R>(&mut self, error: ProtocolError) -> Result<R, ProtocolError> {
        self.termination = Some(Termination::Error(error.clone()));
        self.rx.close();
        Err(error)
    }
}
