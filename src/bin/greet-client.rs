use std::time::Duration;

use clap::{Parser, Subcommand};
use greet_rpc::{
    context::CallContext,
    greet::{
        CalculateSumRequest, ComputeAverageRequest, FindMaximumRequest, Greet, GreetMethod,
        GreetRequest, GreetServiceRequest, GreetServiceResponse, Greeting,
        PrimeNumberDecompositionRequest, SquareRootRequest,
    },
    service::Method,
    transport::client::{Client, ClientConfig},
    util::init_tracing,
    ProtocolErrorType, ServiceError,
};
use tracing::{error, info};

const SERVER_STDIO_COMMAND: &str = "greet-server";
const SERVER_STDIO_COMMAND_ARGS: [&str; 1] = ["stdio"];

#[derive(Debug, Subcommand)]
enum Command {
    /// Greet once.
    Greet,
    /// Add two numbers.
    Sum { x: i32, y: i32 },
    /// Receive ten greetings.
    GreetManyTimes,
    /// Receive the prime factors of a number.
    Decompose { number: i64 },
    /// Send several greetings, receive one combined greeting.
    LongGreet,
    /// Send numbers, receive their average.
    Average { numbers: Vec<i32> },
    /// Exchange greetings with the server.
    GreetEveryone,
    /// Send numbers, receive every new maximum.
    FindMaximum { numbers: Vec<i64> },
    /// Take the square root of a number. Negative numbers are rejected.
    SquareRoot {
        #[arg(allow_negative_numbers = true)]
        number: i32,
    },
    /// Greet slowly, giving up after the deadline.
    GreetWithDeadline {
        #[arg(long, default_value_t = 5000)]
        deadline_ms: u64,
    },
}

/// A client for the greet server.
#[derive(Parser, Debug)]
#[command(about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// The address of the server.
    #[arg(long, default_value = "localhost:50051")]
    address: String,

    /// Spawn the server from this directory and talk to it over stdio
    /// instead of connecting over TCP.
    #[arg(long)]
    stdio_bin_path: Option<String>,

    /// Deadline for calls, in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
}

fn greeting(first_name: &str) -> GreetRequest {
    GreetRequest {
        greeting: Greeting::new(first_name, "Mahana"),
    }
}

fn print_response(response: GreetServiceResponse) {
    match response {
        GreetServiceResponse::Greet(response)
        | GreetServiceResponse::CalculateSum(response)
        | GreetServiceResponse::GreetManyTimes(response)
        | GreetServiceResponse::LongGreet(response)
        | GreetServiceResponse::GreetEveryone(response)
        | GreetServiceResponse::GreetWithDeadline(response) => {
            info!("Response: {}", response.result)
        }
        GreetServiceResponse::PrimeNumberDecomposition(response) => {
            info!("Prime factor: {}", response.prime_factor)
        }
        GreetServiceResponse::ComputeAverage(response) => {
            info!("Average: {}", response.average)
        }
        GreetServiceResponse::FindMaximum(response) => info!("Maximum: {}", response.maximum),
        GreetServiceResponse::SquareRoot(response) => {
            info!("Square root: {}", response.number_root)
        }
    }
}

async fn stream_requests(
    client: &Client<Greet>,
    method: GreetMethod,
    requests: Vec<GreetServiceRequest>,
) -> Result<(), ServiceError> {
    let mut call = client.call(method, None)?;
    for request in requests {
        info!("Sending: {:?}", request);
        call.send(request)?;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    call.close_send();
    match method.shape().has_single_response() {
        true => print_response(call.response().await?),
        false => {
            while let Some(response) = call.recv().await? {
                print_response(response);
            }
            call.finish().await?;
        }
    }
    Ok(())
}

async fn receive_stream(
    client: &Client<Greet>,
    method: GreetMethod,
    request: GreetServiceRequest,
) -> Result<(), ServiceError> {
    let mut call = client.call(method, Some(request))?;
    while let Some(response) = call.recv().await? {
        print_response(response);
    }
    call.finish().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
    init_tracing()?;

    let cli = Cli::parse();

    let mut config = ClientConfig {
        address: cli.address,
        bin_path: cli.stdio_bin_path.clone(),
        ..Default::default()
    };
    if let Some(timeout_secs) = cli.timeout_secs {
        config.timeout_secs = timeout_secs;
    }
    let client = match cli.stdio_bin_path {
        Some(_) => {
            Client::<Greet>::spawn_stdio(SERVER_STDIO_COMMAND, &SERVER_STDIO_COMMAND_ARGS, config)
                .await?
        }
        None => Client::<Greet>::connect(config).await?,
    };

    match cli.command {
        Command::Greet => print_response(
            client
                .unary(
                    GreetMethod::Greet,
                    GreetServiceRequest::Greet(greeting("Deepak")),
                )
                .await?,
        ),
        Command::Sum { x, y } => print_response(
            client
                .unary(
                    GreetMethod::CalculateSum,
                    GreetServiceRequest::CalculateSum(CalculateSumRequest { x, y }),
                )
                .await?,
        ),
        Command::GreetManyTimes => {
            receive_stream(
                &client,
                GreetMethod::GreetManyTimes,
                GreetServiceRequest::GreetManyTimes(greeting("Deepak")),
            )
            .await?
        }
        Command::Decompose { number } => {
            receive_stream(
                &client,
                GreetMethod::PrimeNumberDecomposition,
                GreetServiceRequest::PrimeNumberDecomposition(PrimeNumberDecompositionRequest {
                    number,
                }),
            )
            .await?
        }
        Command::LongGreet => {
            let requests = ["Deepak", "John", "Lucy", "Mark", "Piper"]
                .into_iter()
                .map(|name| GreetServiceRequest::LongGreet(greeting(name)))
                .collect();
            stream_requests(&client, GreetMethod::LongGreet, requests).await?
        }
        Command::Average { numbers } => {
            let requests = numbers
                .into_iter()
                .map(|number| GreetServiceRequest::ComputeAverage(ComputeAverageRequest { number }))
                .collect();
            stream_requests(&client, GreetMethod::ComputeAverage, requests).await?
        }
        Command::GreetEveryone => {
            let requests = ["Deepak", "John", "Lucy", "Mark", "Piper"]
                .into_iter()
                .map(|name| GreetServiceRequest::GreetEveryone(greeting(name)))
                .collect();
            stream_requests(&client, GreetMethod::GreetEveryone, requests).await?
        }
        Command::FindMaximum { numbers } => {
            let requests = numbers
                .into_iter()
                .map(|number| GreetServiceRequest::FindMaximum(FindMaximumRequest { number }))
                .collect();
            stream_requests(&client, GreetMethod::FindMaximum, requests).await?
        }
        Command::SquareRoot { number } => {
            match client
                .unary(
                    GreetMethod::SquareRoot,
                    GreetServiceRequest::SquareRoot(SquareRootRequest { number }),
                )
                .await
            {
                Ok(response) => print_response(response),
                Err(e) if e.error_type == ProtocolErrorType::InvalidArgument => {
                    error!("We probably sent a negative number: {}", e)
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::GreetWithDeadline { deadline_ms } => {
            let context = CallContext::with_timeout(Duration::from_millis(deadline_ms));
            let call = client.call_with_context(
                GreetMethod::GreetWithDeadline,
                Some(GreetServiceRequest::GreetWithDeadline(greeting("Deepak"))),
                context,
            )?;
            match call.response().await {
                Ok(response) => print_response(response),
                Err(e) if e.error_type == ProtocolErrorType::DeadlineExceeded => {
                    error!("Timeout was hit! Deadline was exceeded")
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(())
}
