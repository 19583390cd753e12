use serde_json::Value;

use crate::{
    service::Method,
    transport::JsonRpcCodec,
    util::{parse_from_value, to_value},
    ProtocolError,
};

use super::{BlogMethod, BlogRpc, BlogServiceRequest, BlogServiceResponse};

impl JsonRpcCodec for BlogRpc {
    fn method_from_name(name: &str) -> Option<BlogMethod> {
        BlogMethod::ALL
            .into_iter()
            .find(|method| method.name() == name)
    }

    fn decode_request(
        method: BlogMethod,
        params: Value,
    ) -> Result<BlogServiceRequest, ProtocolError> {
        Ok(match method {
            BlogMethod::CreateBlog => BlogServiceRequest::CreateBlog(parse_from_value(params)?),
            BlogMethod::ReadBlog => BlogServiceRequest::ReadBlog(parse_from_value(params)?),
            BlogMethod::UpdateBlog => BlogServiceRequest::UpdateBlog(parse_from_value(params)?),
            BlogMethod::DeleteBlog => BlogServiceRequest::DeleteBlog(parse_from_value(params)?),
            BlogMethod::ListBlog => BlogServiceRequest::ListBlog(parse_from_value(params)?),
        })
    }

    fn encode_request(request: &BlogServiceRequest) -> Result<Value, ProtocolError> {
        match request {
            BlogServiceRequest::CreateBlog(request) | BlogServiceRequest::UpdateBlog(request) => {
                to_value(request)
            }
            BlogServiceRequest::ReadBlog(request) | BlogServiceRequest::DeleteBlog(request) => {
                to_value(request)
            }
            BlogServiceRequest::ListBlog(request) => to_value(request),
        }
    }

    fn decode_response(
        method: BlogMethod,
        result: Value,
    ) -> Result<BlogServiceResponse, ProtocolError> {
        Ok(match method {
            BlogMethod::CreateBlog => BlogServiceResponse::CreateBlog(parse_from_value(result)?),
            BlogMethod::ReadBlog => BlogServiceResponse::ReadBlog(parse_from_value(result)?),
            BlogMethod::UpdateBlog => BlogServiceResponse::UpdateBlog(parse_from_value(result)?),
            BlogMethod::DeleteBlog => BlogServiceResponse::DeleteBlog(parse_from_value(result)?),
            BlogMethod::ListBlog => BlogServiceResponse::ListBlog(parse_from_value(result)?),
        })
    }

    fn encode_response(response: &BlogServiceResponse) -> Result<Value, ProtocolError> {
        match response {
            BlogServiceResponse::CreateBlog(response)
            | BlogServiceResponse::ReadBlog(response)
            | BlogServiceResponse::UpdateBlog(response)
            | BlogServiceResponse::ListBlog(response) => to_value(response),
            BlogServiceResponse::DeleteBlog(response) => to_value(response),
        }
    }
}
