use clap::{Parser, Subcommand};
use greet_rpc::{
    greet::{Greet, GreetService, GreetServiceConfig},
    transport::server::{Server, ServerConfig},
    util::{init_tracing, shutdown_signal},
    ServiceError,
};

#[derive(Debug, Subcommand)]
enum Command {
    /// Listen for TCP connections.
    Tcp,
    /// Serve a single client over stdin/stdout.
    Stdio,
}

/// A server that greets clients, one method per call shape.
#[derive(Parser, Debug)]
#[command(about)]
struct Cli {
    #[command(subcommand)]
    transport: Command,

    /// The address the TCP server should listen on.
    #[arg(long, default_value = "0.0.0.0:50051")]
    address: String,

    /// Upper bound on the duration of any call, in seconds.
    #[arg(long)]
    service_timeout_secs: Option<u64>,

    /// Pause after each greetManyTimes response, in milliseconds.
    #[arg(long)]
    greet_interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
    init_tracing()?;

    let cli = Cli::parse();

    let mut service_config = GreetServiceConfig::default();
    if let Some(greet_interval_ms) = cli.greet_interval_ms {
        service_config.greet_interval_ms = greet_interval_ms;
    }
    let mut server_config = ServerConfig {
        address: cli.address,
        ..Default::default()
    };
    if let Some(service_timeout_secs) = cli.service_timeout_secs {
        server_config.service_timeout_secs = service_timeout_secs;
    }

    let server = Server::<Greet, _>::new(GreetService::new(service_config), server_config);
    match cli.transport {
        Command::Tcp => server.run(shutdown_signal()).await?,
        Command::Stdio => server.serve_stdio().await?,
    }
    Ok(())
}
