use std::sync::Arc;

use clap::Parser;
use greet_rpc::{
    blog::{
        store::{DocumentStore, MemoryStore},
        BlogRpc, BlogService,
    },
    transport::server::{Server, ServerConfig},
    util::{init_tracing, shutdown_signal},
    ServiceError,
};
use tracing::info;

/// A server that keeps blogs in an in-memory document store.
#[derive(Parser, Debug)]
#[command(about)]
struct Cli {
    /// The address the server should listen on.
    #[arg(long, default_value = "0.0.0.0:50051")]
    address: String,

    /// Seconds in-flight calls are given to finish on shutdown.
    #[arg(long, default_value_t = 10)]
    shutdown_grace_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
    init_tracing()?;

    let cli = Cli::parse();

    let store = Arc::new(MemoryStore::new());
    info!("blog service started");
    let server = Server::<BlogRpc, _>::new(
        BlogService::new(store.clone()),
        ServerConfig {
            address: cli.address,
            shutdown_grace_secs: cli.shutdown_grace_secs,
            ..Default::default()
        },
    );
    let result = server.run(shutdown_signal()).await;

    info!("closing the document store");
    store.disconnect().await?;
    Ok(result?)
}
