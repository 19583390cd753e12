//! The greeting service: one method per call shape, plus error and
//! deadline demonstrations.

mod convert;
mod service;

use serde::{Deserialize, Serialize};

use crate::{
    service::{Method, Rpc},
    session::CallShape,
};

pub use service::{GreetService, GreetServiceConfig};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Greeting {
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl Greeting {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }
}

/// Request carrying a single greeting. Used by every greeting method.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GreetRequest {
    pub greeting: Greeting,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalculateSumRequest {
    pub x: i32,
    pub y: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrimeNumberDecompositionRequest {
    pub number: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComputeAverageRequest {
    pub number: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FindMaximumRequest {
    pub number: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SquareRootRequest {
    pub number: i32,
}

/// Textual result of the greeting and sum methods.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GreetResponse {
    pub result: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrimeFactorResponse {
    pub prime_factor: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComputeAverageResponse {
    pub average: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FindMaximumResponse {
    pub maximum: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SquareRootResponse {
    pub number_root: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GreetMethod {
    Greet,
    CalculateSum,
    GreetManyTimes,
    PrimeNumberDecomposition,
    LongGreet,
    ComputeAverage,
    GreetEveryone,
    FindMaximum,
    SquareRoot,
    GreetWithDeadline,
}

impl GreetMethod {
    pub const ALL: [GreetMethod; 10] = [
        GreetMethod::Greet,
        GreetMethod::CalculateSum,
        GreetMethod::GreetManyTimes,
        GreetMethod::PrimeNumberDecomposition,
        GreetMethod::LongGreet,
        GreetMethod::ComputeAverage,
        GreetMethod::GreetEveryone,
        GreetMethod::FindMaximum,
        GreetMethod::SquareRoot,
        GreetMethod::GreetWithDeadline,
    ];
}

impl Method for GreetMethod {
    fn name(self) -> &'static str {
        match self {
            GreetMethod::Greet => "greet",
            GreetMethod::CalculateSum => "calculateSum",
            GreetMethod::GreetManyTimes => "greetManyTimes",
            GreetMethod::PrimeNumberDecomposition => "primeNumberDecomposition",
            GreetMethod::LongGreet => "longGreet",
            GreetMethod::ComputeAverage => "computeAverage",
            GreetMethod::GreetEveryone => "greetEveryone",
            GreetMethod::FindMaximum => "findMaximum",
            GreetMethod::SquareRoot => "squareRoot",
            GreetMethod::GreetWithDeadline => "greetWithDeadline",
        }
    }

    fn shape(self) -> CallShape {
        match self {
            GreetMethod::Greet
            | GreetMethod::CalculateSum
            | GreetMethod::SquareRoot
            | GreetMethod::GreetWithDeadline => CallShape::Unary,
            GreetMethod::GreetManyTimes | GreetMethod::PrimeNumberDecomposition => {
                CallShape::ServerStreaming
            }
            GreetMethod::LongGreet | GreetMethod::ComputeAverage => CallShape::ClientStreaming,
            GreetMethod::GreetEveryone | GreetMethod::FindMaximum => CallShape::Bidirectional,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum GreetServiceRequest {
    Greet(GreetRequest),
    CalculateSum(CalculateSumRequest),
    GreetManyTimes(GreetRequest),
    PrimeNumberDecomposition(PrimeNumberDecompositionRequest),
    LongGreet(GreetRequest),
    ComputeAverage(ComputeAverageRequest),
    GreetEveryone(GreetRequest),
    FindMaximum(FindMaximumRequest),
    SquareRoot(SquareRootRequest),
    GreetWithDeadline(GreetRequest),
}

#[derive(Clone, Debug, PartialEq)]
pub enum GreetServiceResponse {
    Greet(GreetResponse),
    CalculateSum(GreetResponse),
    GreetManyTimes(GreetResponse),
    PrimeNumberDecomposition(PrimeFactorResponse),
    LongGreet(GreetResponse),
    ComputeAverage(ComputeAverageResponse),
    GreetEveryone(GreetResponse),
    FindMaximum(FindMaximumResponse),
    SquareRoot(SquareRootResponse),
    GreetWithDeadline(GreetResponse),
}

/// Binds [`GreetMethod`], [`GreetServiceRequest`] and
/// [`GreetServiceResponse`] together.
#[derive(Debug)]
pub struct Greet;

impl Rpc for Greet {
    type Method = GreetMethod;
    type Request = GreetServiceRequest;
    type Response = GreetServiceResponse;
}
