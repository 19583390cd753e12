mod comm;

use std::{path::Path, process::Stdio, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    process::{Child, Command},
    sync::{mpsc::UnboundedSender, oneshot},
};

use crate::{
    call::{CallHandle, CallOutcome},
    context::CallContext,
    service::{Method, Rpc},
    session::{open_session, StreamSession},
    ConfigExampleSnippet, ProtocolError, DEFAULT_TIMEOUT_SECS,
};

use self::comm::ClientCommTask;

use super::{JsonRpcCodec, TransportError};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub address: String,
    pub bin_path: Option<String>,
    pub timeout_secs: u64,
}

impl ConfigExampleSnippet for ClientConfig {
    fn config_example_snippet() -> String {
        r#"# The server address to connect to, defaults to localhost:50051
# address = "localhost:50051"

# Path containing the server binaries when spawning over stdio, defaults to $PATH
# bin_path = ""

# The deadline in seconds for calls, defaults to 900
# timeout_secs = 60"#
            .into()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: "localhost:50051".to_string(),
            bin_path: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// A call handed from a [`Client`] to the comm task. `session` is the end
/// the comm task serves on behalf of the remote server.
struct ClientCallTrx<P: Rpc> {
    method: P::Method,
    request: Option<P::Request>,
    session: StreamSession<P::Response, P::Request>,
    outcome_tx: oneshot::Sender<CallOutcome<P::Response>>,
}

/// Calls a remote server over one connection.
///
/// Cloning the client shares the connection. The connection is closed once
/// every clone is dropped and every open call has completed.
pub struct Client<P: JsonRpcCodec> {
    _child: Option<Arc<Child>>,
    to_comm_tx: UnboundedSender<ClientCallTrx<P>>,
    config: Arc<ClientConfig>,
}

impl<P: JsonRpcCodec> Clone for Client<P> {
    fn clone(&self) -> Self {
        Self {
            _child: self._child.clone(),
            to_comm_tx: self.to_comm_tx.clone(),
            config: self.config.clone(),
        }
    }
}

impl<P: JsonRpcCodec> Client<P> {
    /// Connects to the server at the configured address.
    pub async fn connect(config: ClientConfig) -> std::io::Result<Self> {
        let stream = TcpStream::connect(&config.address).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(Self::from_io(reader, writer, config))
    }

    /// Spawns `program` and talks to it over its stdin and stdout.
    pub async fn spawn_stdio(
        program: &str,
        args: &[&str],
        config: ClientConfig,
    ) -> std::io::Result<Self> {
        let program = match config.bin_path.as_ref() {
            Some(bin_path) => Path::new(bin_path).join(program),
            None => Path::new(program).to_path_buf(),
        };
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "child process stdio was not captured",
            ));
        };
        let mut client = Self::from_io(stdout, stdin, config);
        client._child = Some(Arc::new(child));
        Ok(client)
    }

    /// Runs the protocol over an established byte stream, such as one
    /// already wrapped in an encryption layer.
    pub fn from_io<R, W>(reader: R, writer: W, config: ClientConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (comm_task, to_comm_tx) = ClientCommTask::<P, R, W>::new(reader, writer);
        comm_task.start();
        Self {
            _child: None,
            to_comm_tx,
            config: Arc::new(config),
        }
    }

    /// Opens a call whose deadline is the configured timeout from now.
    pub fn call(
        &self,
        method: P::Method,
        request: Option<P::Request>,
    ) -> Result<CallHandle<P::Request, P::Response>, ProtocolError> {
        let context = CallContext::with_timeout(Duration::from_secs(self.config.timeout_secs));
        self.call_with_context(method, request, context)
    }

    /// Opens a call supervised by `context`. Cancelling the context aborts
    /// the call on the server too.
    pub fn call_with_context(
        &self,
        method: P::Method,
        request: Option<P::Request>,
        context: CallContext,
    ) -> Result<CallHandle<P::Request, P::Response>, ProtocolError> {
        let shape = method.shape();
        if shape.has_single_request() != request.is_some() {
            return Err(ProtocolError::invalid_argument(format!(
                "{} is a {:?} method, the request does not match",
                method.name(),
                shape
            )));
        }
        let (caller, session) = open_session(shape, context);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        self.to_comm_tx
            .send(ClientCallTrx {
                method,
                request,
                session,
                outcome_tx,
            })
            .map_err(|_| ProtocolError::from(TransportError::ConnectionClosed))?;
        Ok(CallHandle::new(caller, outcome_rx))
    }

    /// Performs a unary call.
    pub async fn unary(
        &self,
        method: P::Method,
        request: P::Request,
    ) -> Result<P::Response, ProtocolError> {
        self.call(method, Some(request))?.response().await
    }
}
