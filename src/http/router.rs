//! Route dispatch and JSON error responses
//!
//! Builds the [`RequestDescriptor`] the echo core consumes, invokes the core
//! and turns every failure into an error body of the form
//! `{"error": {"message", "timestamp", "requestId"?, "path"?}}`.

use super::body::{BodyError, parse_body};
use super::protocol::{HttpProtocolError, HttpRequest, HttpResponse};
use crate::EchoError;
use crate::echo::builder::iso_timestamp;
use crate::echo::request::{origin_form, parse_query, split_target};
use crate::echo::{EchoResponseAssembler, ProcessContext, RequestDescriptor, build_health_status};
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, warn};

pub const ECHO_PATH: &str = "/echo";
pub const HEALTH_PATH: &str = "/health";

const REQUEST_ID_HEADER: &str = "x-request-id";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
const FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";
const FORWARDED_HOST_HEADER: &str = "x-forwarded-host";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    pub message: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, request_id: Option<String>, path: Option<String>) -> Self {
        Self {
            error: ErrorDetails {
                message: message.into(),
                timestamp: iso_timestamp(),
                request_id,
                path,
            },
        }
    }

    /// Serializes into a response with `status`
    pub fn into_response(self, status: StatusCode) -> HttpResponse {
        HttpResponse::json(status, &self).unwrap_or_else(|e| {
            error!(error = %e, "Failed to serialize error response");
            plain_response(status, "")
        })
    }
}

fn plain_response(status: StatusCode, body: &'static str) -> HttpResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    HttpResponse {
        status,
        headers,
        body: Bytes::from_static(body.as_bytes()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Echo,
    Health,
    NotFound,
}

/// Matches a path case-insensitively, tolerating one trailing slash
fn matches_path(path: &str, route: &str) -> bool {
    let path = match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => path,
    };
    path.eq_ignore_ascii_case(route)
}

fn route(method: &Method, path: &str) -> Route {
    if matches_path(path, ECHO_PATH) {
        Route::Echo
    } else if matches_path(path, HEALTH_PATH) && (*method == Method::GET || *method == Method::HEAD) {
        Route::Health
    } else {
        Route::NotFound
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// First entry of a comma-separated forwarding header
fn first_forwarded<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    header_str(headers, name)
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Dispatches requests to the echo core
#[derive(Debug, Clone)]
pub struct Router {
    assembler: EchoResponseAssembler,
    context: Arc<ProcessContext>,
    trust_proxy: bool,
}

impl Router {
    pub fn new(context: Arc<ProcessContext>, trust_proxy: bool) -> Self {
        Self {
            assembler: EchoResponseAssembler::new(Arc::clone(&context)),
            context,
            trust_proxy,
        }
    }

    /// Produces the response for one request received from `peer`
    ///
    /// The body is parsed before routing, so malformed JSON is rejected on
    /// every path.
    pub fn handle(&self, request: &HttpRequest, peer: Option<SocketAddr>) -> HttpResponse {
        let (path, _) = split_target(&request.target);

        let body = match parse_body(&request.headers, &request.body) {
            Ok(body) => body,
            Err(BodyError::InvalidJson(e)) => {
                warn!(
                    error = %e,
                    path,
                    body = %String::from_utf8_lossy(&request.body),
                    "Invalid JSON received"
                );
                return ErrorResponse::new(
                    "Invalid JSON format",
                    request_id(&request.headers),
                    Some(path.to_string()),
                )
                .into_response(StatusCode::BAD_REQUEST);
            }
        };

        match route(&request.method, path) {
            Route::Health => self.health(),
            Route::Echo => {
                let descriptor = self.descriptor(request, body, peer);
                self.echo(request, &descriptor)
            }
            Route::NotFound => {
                warn!(method = %request.method, url = %request.target, "Route not found");
                ErrorResponse::new("Not Found", None, Some(path.to_string()))
                    .into_response(StatusCode::NOT_FOUND)
            }
        }
    }

    fn health(&self) -> HttpResponse {
        let health = build_health_status(&self.context);
        HttpResponse::json(StatusCode::OK, &health)
            .unwrap_or_else(|e| plain_response_for(StatusCode::INTERNAL_SERVER_ERROR, &e))
    }

    fn echo(&self, request: &HttpRequest, descriptor: &RequestDescriptor) -> HttpResponse {
        let result = self
            .assembler
            .build_timed_echo(descriptor)
            .and_then(|response| {
                HttpResponse::json(StatusCode::OK, &response).map_err(EchoError::from)
            });

        match result {
            Ok(response) => response,
            Err(e) => self.internal_error(&e, request, &descriptor.path),
        }
    }

    /// Builds the descriptor the echo core consumes
    pub fn describe(
        &self,
        request: &HttpRequest,
        peer: Option<SocketAddr>,
    ) -> Result<RequestDescriptor, BodyError> {
        let body = parse_body(&request.headers, &request.body)?;
        Ok(self.descriptor(request, body, peer))
    }

    fn descriptor(
        &self,
        request: &HttpRequest,
        body: Value,
        peer: Option<SocketAddr>,
    ) -> RequestDescriptor {
        let (path, query) = split_target(&request.target);
        let peer_ip = peer.map(|addr| addr.ip().to_string());

        let mut client_ip = peer_ip.clone();
        let mut protocol = "http".to_string();
        let mut host = header_str(&request.headers, HOST.as_str()).map(str::to_string);

        if self.trust_proxy {
            if let Some(forwarded) = first_forwarded(&request.headers, FORWARDED_FOR_HEADER) {
                client_ip = Some(forwarded.to_string());
            }
            if let Some(proto) = first_forwarded(&request.headers, FORWARDED_PROTO_HEADER) {
                protocol = proto.to_ascii_lowercase();
            }
            if let Some(forwarded_host) = first_forwarded(&request.headers, FORWARDED_HOST_HEADER)
            {
                host = Some(forwarded_host.to_string());
            }
        }

        RequestDescriptor {
            method: request.method.clone(),
            path: path.to_string(),
            original_url: origin_form(&request.target),
            query: query.map(parse_query).unwrap_or_default(),
            body,
            headers: request.headers.clone(),
            protocol,
            host,
            client_ip,
            remote_addr: peer_ip,
        }
    }

    fn internal_error(&self, err: &EchoError, request: &HttpRequest, path: &str) -> HttpResponse {
        let request_id = request_id(&request.headers);
        error!(
            error = %err,
            method = %request.method,
            url = %request.target,
            request_id = request_id.as_deref().unwrap_or("unknown"),
            "Failed to build echo response"
        );

        let message = if self.context.is_production() {
            "Internal Server Error".to_string()
        } else {
            err.to_string()
        };
        ErrorResponse::new(message, request_id, Some(path.to_string()))
            .into_response(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

fn request_id(headers: &HeaderMap) -> Option<String> {
    header_str(headers, REQUEST_ID_HEADER).map(str::to_string)
}

fn plain_response_for(status: StatusCode, err: &serde_json::Error) -> HttpResponse {
    error!(error = %err, "Failed to serialize response");
    plain_response(status, "Internal Server Error")
}

/// Error response for a request that could not be read, if one should be sent
pub fn protocol_error_response(err: &HttpProtocolError) -> Option<HttpResponse> {
    let (status, message) = match err {
        HttpProtocolError::HttpParse(_) | HttpProtocolError::InvalidRequest(_) => {
            (StatusCode::BAD_REQUEST, "Bad Request")
        }
        HttpProtocolError::HeadersTooLarge(_) => (
            StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            "Request Header Fields Too Large",
        ),
        HttpProtocolError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large"),
        HttpProtocolError::UnsupportedTransferEncoding(_) => {
            (StatusCode::NOT_IMPLEMENTED, "Not Implemented")
        }
        HttpProtocolError::Io(_) | HttpProtocolError::IncompleteRequest => return None,
    };
    Some(ErrorResponse::new(message, None, None).into_response(status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::echo::EnvironmentSource;
    use crate::security::SizeError;
    use http::Version;
    use serde_json::{Value, json};
    use std::time::Instant;

    fn router(environment: &str, trust_proxy: bool) -> Router {
        let context = ProcessContext::new(Instant::now(), "test-host", "test-runtime")
            .with_environment(EnvironmentSource::Fixed(environment.to_string()));
        Router::new(Arc::new(context), trust_proxy)
    }

    fn request(
        method: Method,
        target: &str,
        headers: &[(&'static str, &'static str)],
        body: &'static [u8],
    ) -> HttpRequest {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            header_map.append(*name, HeaderValue::from_static(*value));
        }
        HttpRequest {
            method,
            target: target.to_string(),
            version: Version::HTTP_11,
            headers: header_map,
            body: Bytes::from_static(body),
        }
    }

    fn json_body(response: &HttpResponse) -> Value {
        serde_json::from_slice(&response.body).unwrap()
    }

    fn peer() -> Option<SocketAddr> {
        Some("127.0.0.1:54321".parse().unwrap())
    }

    #[test]
    fn test_echo_get() {
        let response = router("test", false).handle(
            &request(
                Method::GET,
                "/echo?param=test",
                &[("host", "example.com"), ("x-test-header", "test-value")],
                b"",
            ),
            peer(),
        );
        assert_eq!(response.status, StatusCode::OK);

        let body = json_body(&response);
        assert_eq!(body["requestEcho"]["method"], "GET");
        assert_eq!(body["requestEcho"]["headers"]["x-test-header"], "test-value");
        assert_eq!(body["requestEcho"]["arguments"]["param"], "test");
        assert_eq!(body["requestEcho"]["origin"], "127.0.0.1");
        assert_eq!(body["requestEcho"]["url"], "http://example.com/echo?param=test");
    }

    #[test]
    fn test_echo_post_json() {
        let response = router("test", false).handle(
            &request(
                Method::POST,
                "/echo",
                &[("content-type", "application/json")],
                br#"{"test":"data"}"#,
            ),
            peer(),
        );
        assert_eq!(response.status, StatusCode::OK);
        let body = json_body(&response);
        assert_eq!(body["requestEcho"]["body"], json!({ "test": "data" }));
        assert_eq!(body["requestEcho"]["method"], "POST");
    }

    #[test]
    fn test_echo_invalid_json() {
        let response = router("test", false).handle(
            &request(
                Method::POST,
                "/echo",
                &[("content-type", "application/json"), ("x-request-id", "req-1")],
                br#"{"invalid": "json""#,
            ),
            peer(),
        );
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        let body = json_body(&response);
        assert_eq!(body["error"]["message"], "Invalid JSON format");
        assert_eq!(body["error"]["requestId"], "req-1");
        assert_eq!(body["error"]["path"], "/echo");
    }

    #[test]
    fn test_health() {
        let response = router("test", false).handle(&request(Method::GET, "/health", &[], b""), peer());
        assert_eq!(response.status, StatusCode::OK);
        let body = json_body(&response);
        assert_eq!(body["status"], "healthy");
        assert!(body["uptime"].as_f64().unwrap() >= 0.0);
    }

    #[test]
    fn test_health_rejects_post() {
        let response = router("test", false).handle(&request(Method::POST, "/health", &[], b""), peer());
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_not_found() {
        let response =
            router("test", false).handle(&request(Method::GET, "/nonexistent?x=1", &[], b""), peer());
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        let body = json_body(&response);
        assert_eq!(body["error"]["message"], "Not Found");
        assert_eq!(body["error"]["path"], "/nonexistent");
        assert!(body["error"].get("requestId").is_none());
    }

    #[test]
    fn test_route_matching_is_lenient() {
        let router = router("test", false);
        for target in ["/echo/", "/ECHO", "/Echo?x=1"] {
            let response = router.handle(&request(Method::DELETE, target, &[], b""), peer());
            assert_eq!(response.status, StatusCode::OK, "{target}");
        }
        let response = router.handle(&request(Method::GET, "/echo/more", &[], b""), peer());
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    /// Echo of a descriptor the core refuses, as a failing core would see it
    fn failed_echo(environment: &str) -> HttpResponse {
        let router = router(environment, false);
        let request = request(Method::GET, "/echo", &[("x-request-id", "req-500")], b"");
        let mut descriptor = router.describe(&request, peer()).unwrap();
        descriptor.path = "echo".into();
        router.echo(&request, &descriptor)
    }

    #[test]
    fn test_internal_error_message_in_development() {
        let response = failed_echo("development");
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(&response);
        let message = body["error"]["message"].as_str().unwrap();
        assert!(message.contains("does not start with '/'"), "{message}");
        assert_eq!(body["error"]["requestId"], "req-500");
    }

    #[test]
    fn test_internal_error_redacted_in_production() {
        let response = failed_echo("production");
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(&response);
        assert_eq!(body["error"]["message"], "Internal Server Error");
        assert_eq!(body["error"]["requestId"], "req-500");
    }

    #[test]
    fn test_obs_text_header_is_echoed() {
        let mut named = request(Method::GET, "/echo", &[], b"");
        named
            .headers
            .insert("x-name", HeaderValue::from_bytes(b"caf\xe9").unwrap());

        let response = router("production", false).handle(&named, peer());
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(json_body(&response)["requestEcho"]["headers"]["x-name"], "café");
    }

    #[test]
    fn test_invalid_json_rejected_before_routing() {
        let router = router("test", false);
        for (method, target) in [(Method::GET, "/health"), (Method::POST, "/nonexistent")] {
            let response = router.handle(
                &request(
                    method,
                    target,
                    &[("content-type", "application/json")],
                    b"{not json",
                ),
                peer(),
            );
            assert_eq!(response.status, StatusCode::BAD_REQUEST, "{target}");
            let body = json_body(&response);
            assert_eq!(body["error"]["message"], "Invalid JSON format");
            assert_eq!(body["error"]["path"], target);
        }
    }

    #[test]
    fn test_absolute_form_target() {
        let response = router("test", false).handle(
            &request(
                Method::GET,
                "http://example.com/echo?x=1",
                &[("host", "example.com")],
                b"",
            ),
            peer(),
        );
        assert_eq!(response.status, StatusCode::OK);
        let body = json_body(&response);
        assert_eq!(body["requestEcho"]["url"], "http://example.com/echo?x=1");
        assert_eq!(body["requestEcho"]["uri"], "/echo");
    }

    #[test]
    fn test_forwarded_headers_ignored_by_default() {
        let descriptor = router("test", false)
            .describe(
                &request(
                    Method::GET,
                    "/echo",
                    &[("x-forwarded-for", "203.0.113.7, 10.0.0.1"), ("x-forwarded-proto", "https")],
                    b"",
                ),
                peer(),
            )
            .unwrap();
        assert_eq!(descriptor.client_ip.as_deref(), Some("127.0.0.1"));
        assert_eq!(descriptor.protocol, "http");
        assert!(descriptor.host.is_none());
    }

    #[test]
    fn test_forwarded_headers_with_trust_proxy() {
        let descriptor = router("test", true)
            .describe(
                &request(
                    Method::GET,
                    "/echo",
                    &[
                        ("host", "internal:3000"),
                        ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
                        ("x-forwarded-proto", "HTTPS"),
                        ("x-forwarded-host", "public.example.com"),
                    ],
                    b"",
                ),
                peer(),
            )
            .unwrap();
        assert_eq!(descriptor.client_ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(descriptor.remote_addr.as_deref(), Some("127.0.0.1"));
        assert_eq!(descriptor.protocol, "https");
        assert_eq!(descriptor.host.as_deref(), Some("public.example.com"));
    }

    #[test]
    fn test_ipv6_peer() {
        let descriptor = router("test", false)
            .describe(
                &request(Method::GET, "/echo", &[], b""),
                Some("[::1]:8080".parse().unwrap()),
            )
            .unwrap();
        assert_eq!(descriptor.client_ip.as_deref(), Some("::1"));
    }

    #[test]
    fn test_protocol_error_responses() {
        let response =
            protocol_error_response(&HttpProtocolError::HttpParse("bad".into())).unwrap();
        assert_eq!(response.status, StatusCode::BAD_REQUEST);

        let response = protocol_error_response(&HttpProtocolError::UnsupportedTransferEncoding(
            "chunked".into(),
        ))
        .unwrap();
        assert_eq!(response.status, StatusCode::NOT_IMPLEMENTED);

        let too_large = SizeError::TooLarge { size: 2, limit: 1 };
        let response =
            protocol_error_response(&HttpProtocolError::PayloadTooLarge(too_large.clone())).unwrap();
        assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
        let response = protocol_error_response(&HttpProtocolError::HeadersTooLarge(too_large)).unwrap();
        assert_eq!(response.status, StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE);
        assert_eq!(json_body(&response)["error"]["message"], "Request Header Fields Too Large");

        assert!(protocol_error_response(&HttpProtocolError::IncompleteRequest).is_none());
    }
}
