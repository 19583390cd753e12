use std::time::{Duration, Instant};

use greet_rpc::{
    call::{invoke, CallHandle},
    context::CallContext,
    greet::{
        CalculateSumRequest, ComputeAverageRequest, FindMaximumRequest, Greet, GreetMethod,
        GreetRequest, GreetResponse, GreetService, GreetServiceConfig, GreetServiceRequest,
        GreetServiceResponse, Greeting, PrimeNumberDecompositionRequest, SquareRootRequest,
    },
    session::SessionState,
    transport::{
        client::{Client, ClientConfig},
        server::{Server, ServerConfig},
    },
    ProtocolErrorType,
};
use serde_json::{json, Value};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::oneshot,
    task::JoinHandle,
};

fn greeting(first_name: &str) -> GreetRequest {
    GreetRequest {
        greeting: Greeting::new(first_name, "Mahana"),
    }
}

fn call(
    method: GreetMethod,
    request: Option<GreetServiceRequest>,
    context: CallContext,
) -> CallHandle<GreetServiceRequest, GreetServiceResponse> {
    invoke::<Greet, _>(
        GreetService::new(GreetServiceConfig::default()),
        method,
        request,
        context,
    )
}

async fn collect(
    mut call: CallHandle<GreetServiceRequest, GreetServiceResponse>,
) -> Vec<GreetServiceResponse> {
    let mut responses = Vec::new();
    while let Some(response) = call.recv().await.unwrap() {
        responses.push(response);
    }
    call.finish().await.unwrap();
    responses
}

struct TestServer {
    client: Client<Greet>,
    address: String,
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    async fn start(config: GreetServiceConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = Server::<Greet, _>::new(
            GreetService::new(config),
            ServerConfig {
                address: address.clone(),
                shutdown_grace_secs: 1,
                ..Default::default()
            },
        );
        let handle = tokio::spawn(server.serve(listener, async move {
            stop_rx.await.ok();
        }));
        let client = Client::<Greet>::connect(ClientConfig {
            address: address.clone(),
            timeout_secs: 10,
            ..Default::default()
        })
        .await
        .unwrap();
        Self {
            client,
            address,
            stop_tx,
            handle,
        }
    }

    async fn stop(self) {
        drop(self.client);
        self.stop_tx.send(()).ok();
        self.handle.await.unwrap().unwrap();
    }
}

fn fast_config() -> GreetServiceConfig {
    GreetServiceConfig {
        greet_interval_ms: 10,
        deadline_wait_ms: 100,
        deadline_wait_steps: 3,
    }
}

async fn raw_exchange(address: &str, line: &str) -> Value {
    raw_exchange_lines(address, &[line]).await
}

/// Writes `lines` back to back and returns the first line the server sends.
async fn raw_exchange_lines(address: &str, lines: &[&str]) -> Value {
    let stream = TcpStream::connect(address).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    for line in lines {
        writer.write_all(line.as_bytes()).await.unwrap();
        writer.write_all(b"\n").await.unwrap();
    }
    writer.flush().await.unwrap();
    let mut lines = BufReader::new(reader).lines();
    let response = lines.next_line().await.unwrap().unwrap();
    serde_json::from_str(&response).unwrap()
}

#[tokio::test(start_paused = true)]
async fn greet_with_deadline_honours_the_caller_deadline() {
    let error = call(
        GreetMethod::GreetWithDeadline,
        Some(GreetServiceRequest::GreetWithDeadline(greeting("Deepak"))),
        CallContext::with_timeout(Duration::from_secs(1)),
    )
    .response()
    .await
    .unwrap_err();
    assert_eq!(error.error_type, ProtocolErrorType::DeadlineExceeded);

    let response = call(
        GreetMethod::GreetWithDeadline,
        Some(GreetServiceRequest::GreetWithDeadline(greeting("Deepak"))),
        CallContext::with_timeout(Duration::from_secs(5)),
    )
    .response()
    .await
    .unwrap();
    assert_eq!(
        response,
        GreetServiceResponse::GreetWithDeadline(GreetResponse {
            result: "Hello Deepak".to_string()
        })
    );
}

#[tokio::test(start_paused = true)]
async fn greet_many_times_streams_ten_greetings_in_order() {
    let responses = collect(call(
        GreetMethod::GreetManyTimes,
        Some(GreetServiceRequest::GreetManyTimes(greeting("Deepak"))),
        CallContext::new(),
    ))
    .await;
    let results: Vec<String> = responses
        .into_iter()
        .map(|response| match response {
            GreetServiceResponse::GreetManyTimes(response) => response.result,
            other => panic!("unexpected response {other:?}"),
        })
        .collect();
    let expected: Vec<String> = (0..10)
        .map(|i| format!("Hello Deepak number {i}"))
        .collect();
    assert_eq!(results, expected);
}

#[tokio::test(start_paused = true)]
async fn slow_stream_stops_at_the_deadline() {
    let mut call = call(
        GreetMethod::GreetManyTimes,
        Some(GreetServiceRequest::GreetManyTimes(greeting("Deepak"))),
        CallContext::with_timeout(Duration::from_millis(2500)),
    );
    let mut received = 0;
    let error = loop {
        match call.recv().await {
            Ok(Some(_)) => received += 1,
            Ok(None) => panic!("stream completed before the deadline"),
            Err(e) => break e,
        }
    };
    assert_eq!(received, 3);
    assert_eq!(error.error_type, ProtocolErrorType::DeadlineExceeded);
}

#[tokio::test(start_paused = true)]
async fn cancelled_stream_reports_cancelled() {
    let mut call = call(
        GreetMethod::GreetManyTimes,
        Some(GreetServiceRequest::GreetManyTimes(greeting("Deepak"))),
        CallContext::new(),
    );
    assert!(call.recv().await.unwrap().is_some());
    call.cancel();
    let error = call.recv().await.unwrap_err();
    assert_eq!(error.error_type, ProtocolErrorType::Cancelled);
    assert_eq!(call.state(), SessionState::Closed);
    let error = call.finish().await.unwrap_err();
    assert_eq!(error.error_type, ProtocolErrorType::Cancelled);
}

#[tokio::test]
async fn request_must_match_the_method_shape() {
    let error = call(GreetMethod::Greet, None, CallContext::new())
        .response()
        .await
        .unwrap_err();
    assert_eq!(error.error_type, ProtocolErrorType::InvalidArgument);

    let error = call(
        GreetMethod::Greet,
        Some(GreetServiceRequest::SquareRoot(SquareRootRequest { number: 4 })),
        CallContext::new(),
    )
    .response()
    .await
    .unwrap_err();
    assert_eq!(error.error_type, ProtocolErrorType::InvalidArgument);
}

#[tokio::test]
async fn empty_average_is_rejected() {
    let error = call(GreetMethod::ComputeAverage, None, CallContext::new())
        .response()
        .await
        .unwrap_err();
    assert_eq!(error.error_type, ProtocolErrorType::InvalidArgument);
}

#[tokio::test]
async fn wrong_message_in_client_stream_fails_the_call() {
    let mut call = call(GreetMethod::LongGreet, None, CallContext::new());
    call.send(GreetServiceRequest::LongGreet(greeting("Deepak")))
        .unwrap();
    call.send(GreetServiceRequest::FindMaximum(FindMaximumRequest { number: 1 }))
        .unwrap();
    let error = call.response().await.unwrap_err();
    assert_eq!(error.error_type, ProtocolErrorType::InvalidArgument);
}

#[tokio::test]
async fn unary_calls_over_tcp() {
    let server = TestServer::start(fast_config()).await;

    let response = server
        .client
        .unary(
            GreetMethod::Greet,
            GreetServiceRequest::Greet(greeting("Deepak")),
        )
        .await
        .unwrap();
    assert_eq!(
        response,
        GreetServiceResponse::Greet(GreetResponse {
            result: "Hello Deepak".to_string()
        })
    );

    let response = server
        .client
        .unary(
            GreetMethod::CalculateSum,
            GreetServiceRequest::CalculateSum(CalculateSumRequest { x: 3, y: 10 }),
        )
        .await
        .unwrap();
    assert_eq!(
        response,
        GreetServiceResponse::CalculateSum(GreetResponse {
            result: "Sum of 3 and 10 is 13".to_string()
        })
    );

    let response = server
        .client
        .unary(
            GreetMethod::SquareRoot,
            GreetServiceRequest::SquareRoot(SquareRootRequest { number: 10 }),
        )
        .await
        .unwrap();
    let GreetServiceResponse::SquareRoot(response) = response else {
        panic!("unexpected response {response:?}");
    };
    assert!((response.number_root - 3.1622776601683795).abs() < 1e-12);

    let error = server
        .client
        .unary(
            GreetMethod::SquareRoot,
            GreetServiceRequest::SquareRoot(SquareRootRequest { number: -2 }),
        )
        .await
        .unwrap_err();
    assert_eq!(error.error_type, ProtocolErrorType::InvalidArgument);
    assert_eq!(error.to_string(), "Received a negative number : -2");

    server.stop().await;
}

#[tokio::test]
async fn server_streams_over_tcp() {
    let server = TestServer::start(fast_config()).await;

    let mut call = server
        .client
        .call(
            GreetMethod::PrimeNumberDecomposition,
            Some(GreetServiceRequest::PrimeNumberDecomposition(
                PrimeNumberDecompositionRequest { number: 120 },
            )),
        )
        .unwrap();
    let mut factors = Vec::new();
    while let Some(response) = call.recv().await.unwrap() {
        match response {
            GreetServiceResponse::PrimeNumberDecomposition(response) => {
                factors.push(response.prime_factor)
            }
            other => panic!("unexpected response {other:?}"),
        }
    }
    call.finish().await.unwrap();
    assert_eq!(factors, vec![2, 2, 2, 3, 5]);

    let mut call = server
        .client
        .call(
            GreetMethod::GreetManyTimes,
            Some(GreetServiceRequest::GreetManyTimes(greeting("Deepak"))),
        )
        .unwrap();
    let mut count = 0;
    while call.recv().await.unwrap().is_some() {
        count += 1;
    }
    call.finish().await.unwrap();
    assert_eq!(count, 10);

    let error = server
        .client
        .call(
            GreetMethod::PrimeNumberDecomposition,
            Some(GreetServiceRequest::PrimeNumberDecomposition(
                PrimeNumberDecompositionRequest { number: 0 },
            )),
        )
        .unwrap()
        .finish()
        .await
        .unwrap_err();
    assert_eq!(error.error_type, ProtocolErrorType::InvalidArgument);

    server.stop().await;
}

#[tokio::test]
async fn client_streams_over_tcp() {
    let server = TestServer::start(fast_config()).await;

    let mut call = server.client.call(GreetMethod::ComputeAverage, None).unwrap();
    for number in [3, 5, 9, 54, 23] {
        call.send(GreetServiceRequest::ComputeAverage(ComputeAverageRequest {
            number,
        }))
        .unwrap();
    }
    let GreetServiceResponse::ComputeAverage(response) = call.response().await.unwrap() else {
        panic!("unexpected response");
    };
    assert!((response.average - 18.8).abs() < 1e-9);

    let mut call = server.client.call(GreetMethod::LongGreet, None).unwrap();
    for name in ["Deepak", "John", "Lucy"] {
        call.send(GreetServiceRequest::LongGreet(greeting(name)))
            .unwrap();
    }
    assert_eq!(
        call.response().await.unwrap(),
        GreetServiceResponse::LongGreet(GreetResponse {
            result: "Hello Deepak! Hello John! Hello Lucy! ".to_string()
        })
    );

    let error = server
        .client
        .call(GreetMethod::ComputeAverage, None)
        .unwrap()
        .response()
        .await
        .unwrap_err();
    assert_eq!(error.error_type, ProtocolErrorType::InvalidArgument);

    server.stop().await;
}

#[tokio::test]
async fn bidirectional_streams_over_tcp() {
    let server = TestServer::start(fast_config()).await;

    let mut call = server.client.call(GreetMethod::FindMaximum, None).unwrap();
    let mut maxima = Vec::new();
    for number in [4, 7, 2, 19, 4, 6, 32] {
        call.send(GreetServiceRequest::FindMaximum(FindMaximumRequest {
            number,
        }))
        .unwrap();
    }
    call.close_send();
    while let Some(response) = call.recv().await.unwrap() {
        match response {
            GreetServiceResponse::FindMaximum(response) => maxima.push(response.maximum),
            other => panic!("unexpected response {other:?}"),
        }
    }
    assert_eq!(call.state(), SessionState::Closed);
    call.finish().await.unwrap();
    assert_eq!(maxima, vec![4, 7, 19, 32]);

    let mut call = server.client.call(GreetMethod::GreetEveryone, None).unwrap();
    for name in ["Deepak", "John"] {
        call.send(GreetServiceRequest::GreetEveryone(greeting(name)))
            .unwrap();
        let response = call.recv().await.unwrap();
        assert_eq!(
            response,
            Some(GreetServiceResponse::GreetEveryone(
                GreetResponse {
                    result: format!("Hello {name}! ")
                }
            ))
        );
    }
    call.close_send();
    assert_eq!(call.recv().await.unwrap(), None);
    call.finish().await.unwrap();

    server.stop().await;
}

#[tokio::test]
async fn deadlines_and_cancellation_over_tcp() {
    let server = TestServer::start(fast_config()).await;

    let error = server
        .client
        .call_with_context(
            GreetMethod::GreetWithDeadline,
            Some(GreetServiceRequest::GreetWithDeadline(greeting("Deepak"))),
            CallContext::with_timeout(Duration::from_millis(100)),
        )
        .unwrap()
        .response()
        .await
        .unwrap_err();
    assert_eq!(error.error_type, ProtocolErrorType::DeadlineExceeded);

    let response = server
        .client
        .call_with_context(
            GreetMethod::GreetWithDeadline,
            Some(GreetServiceRequest::GreetWithDeadline(greeting("Deepak"))),
            CallContext::with_timeout(Duration::from_secs(5)),
        )
        .unwrap()
        .response()
        .await
        .unwrap();
    assert_eq!(
        response,
        GreetServiceResponse::GreetWithDeadline(GreetResponse {
            result: "Hello Deepak".to_string()
        })
    );

    let mut cancelled = server.client.call(GreetMethod::FindMaximum, None).unwrap();
    cancelled
        .send(GreetServiceRequest::FindMaximum(FindMaximumRequest { number: 1 }))
        .unwrap();
    assert!(cancelled.recv().await.unwrap().is_some());
    cancelled.cancel();
    let error = cancelled.finish().await.unwrap_err();
    assert_eq!(error.error_type, ProtocolErrorType::Cancelled);

    // Other calls on the same connection are unaffected.
    let response = server
        .client
        .unary(
            GreetMethod::Greet,
            GreetServiceRequest::Greet(greeting("Lucy")),
        )
        .await
        .unwrap();
    assert_eq!(
        response,
        GreetServiceResponse::Greet(GreetResponse {
            result: "Hello Lucy".to_string()
        })
    );

    server.stop().await;
}

#[tokio::test]
async fn concurrent_calls_are_isolated() {
    let server = TestServer::start(fast_config()).await;

    let mut failing = server.client.call(GreetMethod::ComputeAverage, None).unwrap();
    let mut streaming = server
        .client
        .call(
            GreetMethod::GreetManyTimes,
            Some(GreetServiceRequest::GreetManyTimes(greeting("Deepak"))),
        )
        .unwrap();
    failing.close_send();
    let error = failing.response().await.unwrap_err();
    assert_eq!(error.error_type, ProtocolErrorType::InvalidArgument);

    let mut count = 0;
    while streaming.recv().await.unwrap().is_some() {
        count += 1;
    }
    streaming.finish().await.unwrap();
    assert_eq!(count, 10);

    server.stop().await;
}

#[tokio::test]
async fn malformed_requests_get_error_responses() {
    let server = TestServer::start(fast_config()).await;

    let response = raw_exchange(
        &server.address,
        r#"{"jsonrpc":"2.0","method":"greetEveryWeek","params":{},"id":1}"#,
    )
    .await;
    assert_eq!(response["id"], json!(1));
    assert_eq!(response["error"]["code"], json!(-32004));

    let response = raw_exchange(
        &server.address,
        r#"{"jsonrpc":"2.0","method":"greet","params":{"greeting":{"first_name":7}},"id":2}"#,
    )
    .await;
    assert_eq!(response["id"], json!(2));
    assert_eq!(response["error"]["code"], json!(-32602));

    let response = raw_exchange(
        &server.address,
        r#"{"jsonrpc":"2.0","method":"greet","params":{"greeting":{"first_name":"Deepak"}},"id":3}"#,
    )
    .await;
    assert_eq!(response["id"], json!(3));
    assert_eq!(response["result"], json!({"result": "Hello Deepak"}));

    server.stop().await;
}

#[tokio::test]
async fn large_prime_decomposition_respects_the_deadline() {
    let started = Instant::now();
    let (_session, outcome) = call(
        GreetMethod::PrimeNumberDecomposition,
        Some(GreetServiceRequest::PrimeNumberDecomposition(
            PrimeNumberDecompositionRequest {
                number: 999_999_999_999_999_989,
            },
        )),
        CallContext::with_timeout(Duration::from_millis(200)),
    )
    .into_parts();
    let error = outcome.await.unwrap().unwrap_err();
    assert_eq!(error.error_type, ProtocolErrorType::DeadlineExceeded);
    assert!(started.elapsed() < Duration::from_secs(2));

    let server = TestServer::start(fast_config()).await;
    let error = server
        .client
        .call_with_context(
            GreetMethod::PrimeNumberDecomposition,
            Some(GreetServiceRequest::PrimeNumberDecomposition(
                PrimeNumberDecompositionRequest {
                    number: 999_999_999_999_999_989,
                },
            )),
            CallContext::with_timeout(Duration::from_millis(200)),
        )
        .unwrap()
        .finish()
        .await
        .unwrap_err();
    assert_eq!(error.error_type, ProtocolErrorType::DeadlineExceeded);

    // The server is free for the next call straight away.
    let started = Instant::now();
    let response = server
        .client
        .unary(
            GreetMethod::Greet,
            GreetServiceRequest::Greet(greeting("Deepak")),
        )
        .await
        .unwrap();
    assert_eq!(
        response,
        GreetServiceResponse::Greet(GreetResponse {
            result: "Hello Deepak".to_string()
        })
    );
    assert!(started.elapsed() < Duration::from_secs(1));

    server.stop().await;
}

#[tokio::test]
async fn cancel_notification_aborts_the_call() {
    let server = TestServer::start(GreetServiceConfig {
        deadline_wait_ms: 1000,
        ..fast_config()
    })
    .await;

    let response = raw_exchange_lines(
        &server.address,
        &[
            r#"{"jsonrpc":"2.0","method":"greetWithDeadline","params":{"greeting":{"first_name":"Deepak"}},"id":1}"#,
            r#"{"jsonrpc":"2.0","method":"$/cancelRequest","params":{"id":1}}"#,
        ],
    )
    .await;
    assert_eq!(response["id"], json!(1));
    assert_eq!(response["error"]["code"], json!(-32800));

    server.stop().await;
}

#[tokio::test]
async fn client_sends_cancel_notification() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let client = Client::<Greet>::connect(ClientConfig {
        address,
        ..Default::default()
    })
    .await
    .unwrap();
    let (stream, _) = listener.accept().await.unwrap();
    let mut lines = BufReader::new(stream).lines();

    let call = client
        .call(
            GreetMethod::GreetWithDeadline,
            Some(GreetServiceRequest::GreetWithDeadline(greeting("Deepak"))),
        )
        .unwrap();
    let request: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(request["method"], json!("greetWithDeadline"));

    call.cancel();
    let cancel: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(cancel["method"], json!("$/cancelRequest"));
    assert_eq!(cancel["params"]["id"], request["id"]);
    assert!(cancel.get("id").is_none());

    let error = call.response().await.unwrap_err();
    assert_eq!(error.error_type, ProtocolErrorType::Cancelled);
}

#[tokio::test]
async fn shutdown_rejects_new_calls_and_cancels_lingering_ones() {
    let TestServer {
        client,
        stop_tx,
        handle,
        ..
    } = TestServer::start(GreetServiceConfig {
        greet_interval_ms: 500,
        ..fast_config()
    })
    .await;

    let mut streaming = client
        .call(
            GreetMethod::GreetManyTimes,
            Some(GreetServiceRequest::GreetManyTimes(greeting("Deepak"))),
        )
        .unwrap();
    assert!(streaming.recv().await.unwrap().is_some());

    let stopped = Instant::now();
    stop_tx.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let error = client
        .unary(
            GreetMethod::Greet,
            GreetServiceRequest::Greet(greeting("Lucy")),
        )
        .await
        .unwrap_err();
    assert_eq!(error.error_type, ProtocolErrorType::Internal);
    assert_eq!(error.to_string(), "server is shutting down");

    let mut received = 1;
    let error = loop {
        match streaming.recv().await {
            Ok(Some(_)) => received += 1,
            Ok(None) => panic!("stream finished despite the shutdown"),
            Err(e) => break e,
        }
    };
    assert_eq!(error.error_type, ProtocolErrorType::Cancelled);
    assert!(received < 10);

    // grace period of one second, then lingering calls are cancelled
    handle.await.unwrap().unwrap();
    let elapsed = stopped.elapsed();
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(3));
    drop(client);
}
