//! Drivers for the four call shapes, run by services against the serving
//! end of a session.

use futures::{Future, Stream, StreamExt};
use tracing::debug;

use crate::{aggregate::Aggregate, context::CallContext, session::StreamSession, ProtocolError};

/// Computes a single response, preempted by the call's deadline or
/// cancellation.
pub async fn unary<T, F>(context: &CallContext, future: F) -> Result<T, ProtocolError>
where
    F: Future<Output = Result<T, ProtocolError>>,
{
    context.run(future).await?
}

/// Sends every item of `responses` to the caller, then closes the stream
/// cleanly. The first error ends the call with that error.
pub async fn server_streaming<Out, In, S>(
    session: &mut StreamSession<Out, In>,
    responses: S,
) -> Result<(), ProtocolError>
where
    S: Stream<Item = Result<Out, ProtocolError>>,
{
    let context = session.context().clone();
    futures::pin_mut!(responses);
    let mut sent = 0usize;
    while let Some(response) = context.run(responses.next()).await? {
        session.send(response?)?;
        sent += 1;
    }
    session.close_send();
    debug!(sent, "server stream completed");
    Ok(())
}

/// Folds every request into `aggregate` and returns its terminal value
/// once the caller closed the stream.
pub async fn client_streaming<Out, In, A, D>(
    session: &mut StreamSession<Out, In>,
    mut aggregate: A,
    mut decode: D,
) -> Result<A::Output, ProtocolError>
where
    A: Aggregate,
    D: FnMut(In) -> Result<A::Input, ProtocolError>,
{
    let mut received = 0usize;
    while let Some(request) = session.recv().await? {
        aggregate.update(decode(request)?);
        received += 1;
    }
    debug!(received, "client stream completed");
    aggregate.finish()
}

/// Answers each request with at most one response before reading the next.
///
/// The call goes from idle to streaming on the first request, drains once
/// the caller closed its stream, and is closed after the outbound stream is
/// closed in turn.
pub async fn bidirectional<Out, In, F>(
    session: &mut StreamSession<Out, In>,
    mut step: F,
) -> Result<(), ProtocolError>
where
    F: FnMut(In) -> Result<Option<Out>, ProtocolError>,
{
    let mut received = 0usize;
    let mut sent = 0usize;
    while let Some(request) = session.recv().await? {
        if received == 0 {
            debug!("bidirectional stream is streaming");
        }
        received += 1;
        if let Some(response) = step(request)? {
            session.send(response)?;
            sent += 1;
        }
    }
    debug!(received, sent, "bidirectional stream is draining");
    session.close_send();
    debug!(state = ?session.state(), "bidirectional stream closed");
    Ok(())
}
