//! Messages of the `envoy.service.auth.v2.Authorization` service
//!
//! Only the fields the proxy fills in or reads back are modelled. Field tags
//! match the upstream protobuf definitions.

#![allow(missing_docs)]

use std::collections::HashMap;

/// Fully-qualified path of the unary check RPC
pub const CHECK_PATH: &str = "/envoy.service.auth.v2.Authorization/Check";

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckRequest {
    #[prost(message, optional, tag = "1")]
    pub attributes: Option<AttributeContext>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AttributeContext {
    #[prost(message, optional, tag = "4")]
    pub request: Option<RequestAttributes>,
    #[prost(map = "string, string", tag = "10")]
    pub context_extensions: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RequestAttributes {
    #[prost(message, optional, tag = "2")]
    pub http: Option<HttpRequest>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HttpRequest {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub method: String,
    #[prost(map = "string, string", tag = "3")]
    pub headers: HashMap<String, String>,
    #[prost(string, tag = "4")]
    pub path: String,
    #[prost(string, tag = "5")]
    pub host: String,
    #[prost(string, tag = "6")]
    pub scheme: String,
    #[prost(string, tag = "7")]
    pub query: String,
    #[prost(string, tag = "8")]
    pub fragment: String,
    #[prost(int64, tag = "9")]
    pub size: i64,
    #[prost(string, tag = "10")]
    pub protocol: String,
    #[prost(string, tag = "11")]
    pub body: String,
}

/// `google.rpc.Status`
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpcStatus {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HeaderValue {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HeaderValueOption {
    #[prost(message, optional, tag = "1")]
    pub header: Option<HeaderValue>,
    #[prost(message, optional, tag = "2")]
    pub append: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HttpStatus {
    #[prost(int32, tag = "1")]
    pub code: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeniedHttpResponse {
    #[prost(message, optional, tag = "1")]
    pub status: Option<HttpStatus>,
    #[prost(message, repeated, tag = "2")]
    pub headers: Vec<HeaderValueOption>,
    #[prost(string, tag = "3")]
    pub body: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OkHttpResponse {
    #[prost(message, repeated, tag = "2")]
    pub headers: Vec<HeaderValueOption>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CheckResponse {
    #[prost(message, optional, tag = "1")]
    pub status: Option<RpcStatus>,
    #[prost(oneof = "check_response::HttpResponse", tags = "2, 3")]
    pub http_response: Option<check_response::HttpResponse>,
}

pub mod check_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum HttpResponse {
        #[prost(message, tag = "2")]
        DeniedResponse(super::DeniedHttpResponse),
        #[prost(message, tag = "3")]
        OkResponse(super::OkHttpResponse),
    }
}

impl CheckResponse {
    /// True when the decision service returned `OK`.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.code == 0)
    }

    /// Headers the decision service asks to be added upstream or downstream.
    #[must_use]
    pub fn headers(&self) -> Vec<(&str, &str)> {
        let options = match &self.http_response {
            Some(check_response::HttpResponse::OkResponse(ok)) => &ok.headers,
            Some(check_response::HttpResponse::DeniedResponse(denied)) => &denied.headers,
            None => return Vec::new(),
        };
        options
            .iter()
            .filter_map(|o| o.header.as_ref())
            .map(|h| (h.key.as_str(), h.value.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_allowed_response_headers() {
        let response = CheckResponse {
            status: Some(RpcStatus {
                code: 0,
                message: String::new(),
            }),
            http_response: Some(check_response::HttpResponse::OkResponse(OkHttpResponse {
                headers: vec![HeaderValueOption {
                    header: Some(HeaderValue {
                        key: "x-pomerium-jwt-assertion".to_string(),
                        value: "abc".to_string(),
                    }),
                    append: Some(false),
                }],
            })),
        };

        let decoded = CheckResponse::decode(response.encode_to_vec().as_slice()).unwrap();
        assert!(decoded.is_allowed());
        assert_eq!(decoded.headers(), vec![("x-pomerium-jwt-assertion", "abc")]);
    }

    #[test]
    fn test_denied_without_status() {
        let response = CheckResponse {
            status: None,
            http_response: Some(check_response::HttpResponse::DeniedResponse(
                DeniedHttpResponse {
                    status: Some(HttpStatus { code: 403 }),
                    headers: vec![],
                    body: "denied".to_string(),
                },
            )),
        };
        assert!(!response.is_allowed());
        assert!(response.headers().is_empty());
    }
}
