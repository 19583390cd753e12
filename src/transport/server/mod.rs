mod conn;

use std::{future::Future, marker::PhantomData, time::Duration};

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::{
    io::{stdin, stdout, AsyncRead, AsyncWrite},
    net::TcpListener,
    time::timeout,
};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tower::{timeout::Timeout, Service};
use tracing::{debug, info, warn};

use crate::{
    service::{Incoming, ServiceError, ServiceFuture, ServiceResponse},
    ConfigExampleSnippet, DEFAULT_TIMEOUT_SECS,
};

use self::conn::Connection;

use super::JsonRpcCodec;

/// Configuration for the call server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on.
    pub address: String,
    /// Upper bound on the duration of any call, in seconds.
    pub service_timeout_secs: u64,
    /// How long in-flight calls may keep running after shutdown begins.
    pub shutdown_grace_secs: u64,
}

impl ConfigExampleSnippet for ServerConfig {
    fn config_example_snippet() -> String {
        r#"# The address to listen on, defaults to 0.0.0.0:50051
# address = "0.0.0.0:50051"

# The timeout duration in seconds for every call, defaults to 900
# service_timeout_secs = 60

# Seconds in-flight calls are given to finish on shutdown, defaults to 10
# shutdown_grace_secs = 10"#
            .into()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:50051".to_string(),
            service_timeout_secs: DEFAULT_TIMEOUT_SECS,
            shutdown_grace_secs: 10,
        }
    }
}

/// Serves calls of `P` to connected clients.
///
/// Every connection runs its own loop and every call its own task, so a
/// failing call never affects other calls.
pub struct Server<P, S>
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
{
    service: Timeout<S>,
    config: ServerConfig,
    tracker: TaskTracker,
    draining: CancellationToken,
    shutdown: CancellationToken,
    rpc_phantom: PhantomData<P>,
}

impl<P, S> Server<P, S>
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
{
    /// Creates a new server. Calls will be forwarded to `service`.
    pub fn new(service: S, config: ServerConfig) -> Self {
        Self {
            service: Timeout::new(service, Duration::from_secs(config.service_timeout_secs)),
            config,
            tracker: TaskTracker::new(),
            draining: CancellationToken::new(),
            shutdown: CancellationToken::new(),
            rpc_phantom: PhantomData,
        }
    }

    /// Binds the configured address and serves until `signal` completes.
    /// A failure to bind is returned immediately.
    pub async fn run(self, signal: impl Future<Output = ()>) -> std::io::Result<()> {
        let listener = TcpListener::bind(&self.config.address).await?;
        self.serve(listener, signal).await
    }

    /// Serves connections accepted by `listener` until `signal` completes,
    /// then drains in-flight calls.
    pub async fn serve(
        self,
        listener: TcpListener,
        signal: impl Future<Output = ()>,
    ) -> std::io::Result<()> {
        info!("listening on {}", listener.local_addr()?);
        let mut incoming = TcpListenerStream::new(listener);
        tokio::pin!(signal);
        loop {
            tokio::select! {
                _ = &mut signal => break,
                stream = incoming.next() => match stream {
                    Some(Ok(stream)) => {
                        debug!(peer = ?stream.peer_addr().ok(), "accepted connection");
                        let (reader, writer) = stream.into_split();
                        self.spawn_connection(reader, writer);
                    }
                    Some(Err(e)) => warn!("failed to accept connection: {e}"),
                    None => break,
                },
            }
        }
        self.drain().await;
        Ok(())
    }

    /// Serves a single connection over the process's stdin and stdout,
    /// until stdin is closed.
    pub async fn serve_stdio(self) -> std::io::Result<()> {
        self.spawn_connection(stdin(), stdout());
        self.tracker.close();
        self.tracker.wait().await;
        Ok(())
    }

    fn spawn_connection<R, W>(&self, reader: R, writer: W)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let connection = Connection::<P, S, R, W>::new(
            self.service.clone(),
            reader,
            writer,
            self.tracker.clone(),
            self.draining.clone(),
            self.shutdown.clone(),
        );
        self.tracker.spawn(connection.run());
    }

    async fn drain(&self) {
        info!("no longer accepting calls, draining in-flight calls");
        self.draining.cancel();
        self.tracker.close();
        let grace = Duration::from_secs(self.config.shutdown_grace_secs);
        if timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                "in-flight calls still running after {}s, cancelling them",
                grace.as_secs()
            );
            self.shutdown.cancel();
            self.tracker.wait().await;
        }
        info!("server stopped");
    }
}
