use std::{
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use async_stream::try_stream;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tower::Service;
use tracing::info;

use crate::{
    aggregate::{Aggregate, Average, Concatenation, FactorStep, PrimeFactors, RunningMaximum},
    context::CallContext,
    handler,
    service::{Incoming, Method, ServiceError, ServiceFuture, ServiceResponse},
    ConfigExampleSnippet, ProtocolError,
};

use super::{
    CalculateSumRequest, ComputeAverageResponse, FindMaximumResponse, Greet, GreetMethod,
    GreetRequest, GreetResponse, GreetServiceRequest, GreetServiceResponse, Greeting,
    PrimeFactorResponse, SquareRootResponse,
};

const GREET_MANY_TIMES_COUNT: usize = 10;
/// Trial divisions between checks of the call context.
const DIVISIONS_PER_YIELD: u64 = 100_000;

/// Simulated latencies of the greeting service.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GreetServiceConfig {
    /// Pause after each item of `greetManyTimes`, in milliseconds.
    pub greet_interval_ms: u64,
    /// Length of each wait of `greetWithDeadline`, in milliseconds.
    pub deadline_wait_ms: u64,
    /// Number of waits of `greetWithDeadline`.
    pub deadline_wait_steps: u32,
}

impl ConfigExampleSnippet for GreetServiceConfig {
    fn config_example_snippet() -> String {
        r#"# Pause in milliseconds after each greetManyTimes response, defaults to 1000
# greet_interval_ms = 1000

# Length in milliseconds of each greetWithDeadline wait, defaults to 1000
# deadline_wait_ms = 1000

# Number of greetWithDeadline waits, defaults to 3
# deadline_wait_steps = 3"#
            .into()
    }
}

impl Default for GreetServiceConfig {
    fn default() -> Self {
        Self {
            greet_interval_ms: 1000,
            deadline_wait_ms: 1000,
            deadline_wait_steps: 3,
        }
    }
}

#[derive(Clone, Default)]
pub struct GreetService {
    config: Arc<GreetServiceConfig>,
}

impl GreetService {
    pub fn new(config: GreetServiceConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    async fn dispatch(
        config: Arc<GreetServiceConfig>,
        incoming: Incoming<Greet>,
    ) -> Result<ServiceResponse<GreetServiceResponse>, ProtocolError> {
        let Incoming {
            method,
            request,
            mut session,
        } = incoming;
        info!("{} function was invoked", method.name());
        let context = session.context().clone();

        Ok(match (method, request) {
            (GreetMethod::Greet, Some(GreetServiceRequest::Greet(request))) => {
                ServiceResponse::Single(GreetServiceResponse::Greet(greet(&request.greeting)))
            }
            (GreetMethod::CalculateSum, Some(GreetServiceRequest::CalculateSum(request))) => {
                ServiceResponse::Single(GreetServiceResponse::CalculateSum(calculate_sum(
                    &request,
                )))
            }
            (GreetMethod::SquareRoot, Some(GreetServiceRequest::SquareRoot(request))) => {
                ServiceResponse::Single(GreetServiceResponse::SquareRoot(SquareRootResponse {
                    number_root: square_root(request.number)?,
                }))
            }
            (
                GreetMethod::GreetWithDeadline,
                Some(GreetServiceRequest::GreetWithDeadline(request)),
            ) => {
                let response = handler::unary(
                    &context,
                    greet_with_deadline(&context, &config, request.greeting),
                )
                .await?;
                ServiceResponse::Single(GreetServiceResponse::GreetWithDeadline(response))
            }
            (GreetMethod::GreetManyTimes, Some(GreetServiceRequest::GreetManyTimes(request))) => {
                let interval = Duration::from_millis(config.greet_interval_ms);
                handler::server_streaming(
                    &mut session,
                    greet_many_times(context, request.greeting, interval),
                )
                .await?;
                ServiceResponse::Streamed
            }
            (
                GreetMethod::PrimeNumberDecomposition,
                Some(GreetServiceRequest::PrimeNumberDecomposition(request)),
            ) => {
                let factors = PrimeFactors::new(request.number)?;
                handler::server_streaming(&mut session, prime_factors(context, factors)).await?;
                ServiceResponse::Streamed
            }
            (GreetMethod::LongGreet, None) => {
                let result =
                    handler::client_streaming(&mut session, Concatenation::default(), |request| {
                        match request {
                            GreetServiceRequest::LongGreet(request) => {
                                Ok(format!("Hello {}! ", request.greeting.first_name))
                            }
                            other => Err(unexpected_message(method, &other)),
                        }
                    })
                    .await?;
                ServiceResponse::Single(GreetServiceResponse::LongGreet(GreetResponse { result }))
            }
            (GreetMethod::ComputeAverage, None) => {
                let average =
                    handler::client_streaming(&mut session, Average::default(), |request| {
                        match request {
                            GreetServiceRequest::ComputeAverage(request) => Ok(request.number),
                            other => Err(unexpected_message(method, &other)),
                        }
                    })
                    .await?;
                ServiceResponse::Single(GreetServiceResponse::ComputeAverage(
                    ComputeAverageResponse { average },
                ))
            }
            (GreetMethod::GreetEveryone, None) => {
                handler::bidirectional(&mut session, |request| match request {
                    GreetServiceRequest::GreetEveryone(request) => {
                        Ok(Some(GreetServiceResponse::GreetEveryone(GreetResponse {
                            result: format!("Hello {}! ", request.greeting.first_name),
                        })))
                    }
                    other => Err(unexpected_message(method, &other)),
                })
                .await?;
                ServiceResponse::Streamed
            }
            (GreetMethod::FindMaximum, None) => {
                let mut maximum = RunningMaximum::default();
                handler::bidirectional(&mut session, |request| match request {
                    GreetServiceRequest::FindMaximum(request) => Ok(maximum
                        .update(request.number)
                        .map(|maximum| {
                            GreetServiceResponse::FindMaximum(FindMaximumResponse { maximum })
                        })),
                    other => Err(unexpected_message(method, &other)),
                })
                .await?;
                ServiceResponse::Streamed
            }
            (method, request) => {
                return Err(ProtocolError::invalid_argument(format!(
                    "{} cannot handle {:?}",
                    method.name(),
                    request
                )))
            }
        })
    }
}

impl Service<Incoming<Greet>> for GreetService {
    type Response = ServiceResponse<GreetServiceResponse>;
    type Error = ServiceError;
    type Future = ServiceFuture<ServiceResponse<GreetServiceResponse>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, incoming: Incoming<Greet>) -> Self::Future {
        let config = self.config.clone();
        Box::pin(async move { Ok(Self::dispatch(config, incoming).await?) })
    }
}

fn unexpected_message(method: GreetMethod, message: &GreetServiceRequest) -> ProtocolError {
    ProtocolError::invalid_argument(format!(
        "{} received an unexpected message {:?}",
        method.name(),
        message
    ))
}

fn greet(greeting: &Greeting) -> GreetResponse {
    GreetResponse {
        result: format!("Hello {}", greeting.first_name),
    }
}

fn calculate_sum(request: &CalculateSumRequest) -> GreetResponse {
    let sum = i64::from(request.x) + i64::from(request.y);
    GreetResponse {
        result: format!("Sum of {} and {} is {}", request.x, request.y, sum),
    }
}

fn square_root(number: i32) -> Result<f64, ProtocolError> {
    if number < 0 {
        return Err(ProtocolError::invalid_argument(format!(
            "Received a negative number : {}",
            number
        )));
    }
    Ok(f64::from(number).sqrt())
}

fn greet_many_times(
    context: CallContext,
    greeting: Greeting,
    interval: Duration,
) -> impl Stream<Item = Result<GreetServiceResponse, ProtocolError>> {
    try_stream! {
        for i in 0..GREET_MANY_TIMES_COUNT {
            yield GreetServiceResponse::GreetManyTimes(GreetResponse {
                result: format!("Hello {} number {}", greeting.first_name, i),
            });
            context.sleep(interval).await?;
        }
    }
}

fn prime_factors(
    context: CallContext,
    mut factors: PrimeFactors,
) -> impl Stream<Item = Result<GreetServiceResponse, ProtocolError>> {
    try_stream! {
        loop {
            match factors.next_within(DIVISIONS_PER_YIELD) {
                FactorStep::Factor(prime_factor) => {
                    yield GreetServiceResponse::PrimeNumberDecomposition(PrimeFactorResponse {
                        prime_factor,
                    });
                }
                FactorStep::Unfinished => {
                    context.check()?;
                    tokio::task::yield_now().await;
                }
                FactorStep::Exhausted => break,
            }
        }
    }
}

async fn greet_with_deadline(
    context: &CallContext,
    config: &GreetServiceConfig,
    greeting: Greeting,
) -> Result<GreetResponse, ProtocolError> {
    let wait = Duration::from_millis(config.deadline_wait_ms);
    for _ in 0..config.deadline_wait_steps {
        context.sleep(wait).await?;
    }
    Ok(greet(&greeting))
}

#[cfg(test)]
mod tests {
    use crate::ProtocolErrorType;

    use super::*;

    #[test]
    fn sum_does_not_overflow() {
        let response = calculate_sum(&CalculateSumRequest {
            x: i32::MAX,
            y: i32::MAX,
        });
        assert_eq!(
            response.result,
            "Sum of 2147483647 and 2147483647 is 4294967294"
        );
    }

    #[test]
    fn square_root_of_negative_number_is_rejected() {
        assert_eq!(square_root(16).unwrap(), 4.0);
        let error = square_root(-2).unwrap_err();
        assert_eq!(error.error_type, ProtocolErrorType::InvalidArgument);
        assert_eq!(error.to_string(), "Received a negative number : -2");
    }

    #[tokio::test]
    async fn factor_stream_stops_when_cancelled() {
        use futures::StreamExt;

        let context = CallContext::new();
        context.cancel();
        let factors = PrimeFactors::new(999_999_999_999_999_989).unwrap();
        let mut responses = Box::pin(prime_factors(context, factors));
        let error = responses.next().await.unwrap().unwrap_err();
        assert_eq!(error.error_type, ProtocolErrorType::Cancelled);
        assert!(responses.next().await.is_none());
    }

    #[tokio::test]
    async fn factor_stream_yields_every_factor() {
        use futures::TryStreamExt;

        let factors = PrimeFactors::new(120).unwrap();
        let responses: Vec<_> = prime_factors(CallContext::new(), factors)
            .try_collect()
            .await
            .unwrap();
        let factors: Vec<_> = responses
            .into_iter()
            .map(|response| match response {
                GreetServiceResponse::PrimeNumberDecomposition(response) => response.prime_factor,
                other => panic!("unexpected response {other:?}"),
            })
            .collect();
        assert_eq!(factors, vec![2, 2, 2, 3, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_wait_is_preempted() {
        let context = CallContext::with_timeout(Duration::from_secs(1));
        let error = greet_with_deadline(
            &context,
            &GreetServiceConfig::default(),
            Greeting::new("Deepak", "Kumar"),
        )
        .await
        .unwrap_err();
        assert_eq!(error.error_type, ProtocolErrorType::DeadlineExceeded);
    }
}
