use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::ProtocolError;

/// Parses/deserializes a [`serde_json::Value`] into `R`. Returns
/// an "invalid argument" protocol error if deserialization fails. Useful when
/// implementing [`JsonRpcCodec`](crate::transport::JsonRpcCodec) decoders.
pub fn parse_from_value<R: DeserializeOwned>(value: Value) -> Result<R, ProtocolError> {
    serde_json::from_value::<R>(value)
        .map_err(|error| ProtocolError::invalid_argument(error.to_string()))
}

/// Serializes `value` into a [`serde_json::Value`]. Returns an "internal"
/// protocol error if serialization fails.
pub fn to_value<R: Serialize>(value: &R) -> Result<Value, ProtocolError> {
    serde_json::to_value(value).map_err(|error| ProtocolError::internal(error.to_string()))
}

/// Completes on ctrl-c, or on SIGTERM on unix platforms.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install ctrl-c handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

/// Installs the `tracing` subscriber used by the binaries. The filter is
/// read from `RUST_LOG` and defaults to `info`.
#[cfg(feature = "cli")]
pub fn init_tracing() -> Result<(), crate::ServiceError> {
    use tracing_subscriber::{filter::LevelFilter, EnvFilter};

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env()?,
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
