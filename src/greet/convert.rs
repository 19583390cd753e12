use serde_json::Value;

use crate::{
    service::Method,
    transport::JsonRpcCodec,
    util::{parse_from_value, to_value},
    ProtocolError,
};

use super::{Greet, GreetMethod, GreetServiceRequest, GreetServiceResponse};

impl JsonRpcCodec for Greet {
    fn method_from_name(name: &str) -> Option<GreetMethod> {
        GreetMethod::ALL
            .into_iter()
            .find(|method| method.name() == name)
    }

    fn decode_request(
        method: GreetMethod,
        params: Value,
    ) -> Result<GreetServiceRequest, ProtocolError> {
        Ok(match method {
            GreetMethod::Greet => GreetServiceRequest::Greet(parse_from_value(params)?),
            GreetMethod::CalculateSum => {
                GreetServiceRequest::CalculateSum(parse_from_value(params)?)
            }
            GreetMethod::GreetManyTimes => {
                GreetServiceRequest::GreetManyTimes(parse_from_value(params)?)
            }
            GreetMethod::PrimeNumberDecomposition => {
                GreetServiceRequest::PrimeNumberDecomposition(parse_from_value(params)?)
            }
            GreetMethod::LongGreet => GreetServiceRequest::LongGreet(parse_from_value(params)?),
            GreetMethod::ComputeAverage => {
                GreetServiceRequest::ComputeAverage(parse_from_value(params)?)
            }
            GreetMethod::GreetEveryone => {
                GreetServiceRequest::GreetEveryone(parse_from_value(params)?)
            }
            GreetMethod::FindMaximum => {
                GreetServiceRequest::FindMaximum(parse_from_value(params)?)
            }
            GreetMethod::SquareRoot => GreetServiceRequest::SquareRoot(parse_from_value(params)?),
            GreetMethod::GreetWithDeadline => {
                GreetServiceRequest::GreetWithDeadline(parse_from_value(params)?)
            }
        })
    }

    fn encode_request(request: &GreetServiceRequest) -> Result<Value, ProtocolError> {
        match request {
            GreetServiceRequest::Greet(request)
            | GreetServiceRequest::GreetManyTimes(request)
            | GreetServiceRequest::LongGreet(request)
            | GreetServiceRequest::GreetEveryone(request)
            | GreetServiceRequest::GreetWithDeadline(request) => to_value(request),
            GreetServiceRequest::CalculateSum(request) => to_value(request),
            GreetServiceRequest::PrimeNumberDecomposition(request) => to_value(request),
            GreetServiceRequest::ComputeAverage(request) => to_value(request),
            GreetServiceRequest::FindMaximum(request) => to_value(request),
            GreetServiceRequest::SquareRoot(request) => to_value(request),
        }
    }

    fn decode_response(
        method: GreetMethod,
        result: Value,
    ) -> Result<GreetServiceResponse, ProtocolError> {
        Ok(match method {
            GreetMethod::Greet => GreetServiceResponse::Greet(parse_from_value(result)?),
            GreetMethod::CalculateSum => {
                GreetServiceResponse::CalculateSum(parse_from_value(result)?)
            }
            GreetMethod::GreetManyTimes => {
                GreetServiceResponse::GreetManyTimes(parse_from_value(result)?)
            }
            GreetMethod::PrimeNumberDecomposition => {
                GreetServiceResponse::PrimeNumberDecomposition(parse_from_value(result)?)
            }
            GreetMethod::LongGreet => GreetServiceResponse::LongGreet(parse_from_value(result)?),
            GreetMethod::ComputeAverage => {
                GreetServiceResponse::ComputeAverage(parse_from_value(result)?)
            }
            GreetMethod::GreetEveryone => {
                GreetServiceResponse::GreetEveryone(parse_from_value(result)?)
            }
            GreetMethod::FindMaximum => {
                GreetServiceResponse::FindMaximum(parse_from_value(result)?)
            }
            GreetMethod::SquareRoot => {
                GreetServiceResponse::SquareRoot(parse_from_value(result)?)
            }
            GreetMethod::GreetWithDeadline => {
                GreetServiceResponse::GreetWithDeadline(parse_from_value(result)?)
            }
        })
    }

    fn encode_response(response: &GreetServiceResponse) -> Result<Value, ProtocolError> {
        match response {
            GreetServiceResponse::Greet(response)
            | GreetServiceResponse::CalculateSum(response)
            | GreetServiceResponse::GreetManyTimes(response)
            | GreetServiceResponse::LongGreet(response)
            | GreetServiceResponse::GreetEveryone(response)
            | GreetServiceResponse::GreetWithDeadline(response) => to_value(response),
            GreetServiceResponse::PrimeNumberDecomposition(response) => to_value(response),
            GreetServiceResponse::ComputeAverage(response) => to_value(response),
            GreetServiceResponse::FindMaximum(response) => to_value(response),
            GreetServiceResponse::SquareRoot(response) => to_value(response),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{
        greet::{GreetRequest, Greeting, SquareRootResponse},
        ProtocolErrorType,
    };

    use super::*;

    #[test]
    fn every_method_is_found_by_name() {
        for method in GreetMethod::ALL {
            assert_eq!(Greet::method_from_name(method.name()), Some(method));
        }
        assert_eq!(Greet::method_from_name("greetNobody"), None);
    }

    #[test]
    fn decodes_requests_for_the_named_method() {
        let request = Greet::decode_request(
            GreetMethod::LongGreet,
            json!({ "greeting": { "first_name": "Deepak" } }),
        )
        .unwrap();
        assert_eq!(
            request,
            GreetServiceRequest::LongGreet(GreetRequest {
                greeting: Greeting::new("Deepak", ""),
            })
        );
    }

    #[test]
    fn malformed_params_are_invalid_arguments() {
        let error =
            Greet::decode_request(GreetMethod::SquareRoot, json!({ "number": "four" }))
                .unwrap_err();
        assert_eq!(error.error_type, ProtocolErrorType::InvalidArgument);
    }

    #[test]
    fn encodes_responses_as_plain_objects() {
        let value = Greet::encode_response(&GreetServiceResponse::SquareRoot(SquareRootResponse {
            number_root: 3.0,
        }))
        .unwrap();
        assert_eq!(value, json!({ "number_root": 3.0 }));
    }
}
