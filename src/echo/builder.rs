use super::request::{RequestDescriptor, pairs_to_object};
use crate::{EchoError, Result};
use chrono::{SecondsFormat, Utc};
use http::HeaderMap;
use http::header::SET_COOKIE;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Origin reported when no client address is known
pub const UNKNOWN_ORIGIN: &str = "unknown";
/// Host used in the reconstructed URL when the request carries none
pub const DEFAULT_HOST: &str = "localhost";
/// Argument key that always carries the request path
pub const URI_ARGUMENT: &str = "uri";

/// A received header value, or all values of a repeated header
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum HeaderValues {
    Single(String),
    Multiple(Vec<String>),
}

/// Canonical description of one request, as echoed back to the client
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestEcho {
    pub headers: BTreeMap<String, HeaderValues>,
    pub method: String,
    pub origin: String,
    pub uri: String,
    pub arguments: Map<String, Value>,
    pub body: Value,
    pub url: String,
    pub timestamp: String,
}

/// Builds the echo for `request`
///
/// Fails when the descriptor's path is not rooted at `/`.
pub fn build_request_echo(request: &RequestDescriptor) -> Result<RequestEcho> {
    if !request.path.starts_with('/') {
        return Err(EchoError::MalformedRequest(format!(
            "path {:?} does not start with '/'",
            request.path
        )));
    }

    Ok(RequestEcho {
        headers: echo_headers(&request.headers),
        method: request.method.as_str().to_ascii_uppercase(),
        origin: resolve_origin(request).to_string(),
        uri: request.path.clone(),
        arguments: merge_arguments(&request.query, &request.path),
        body: request.body.clone(),
        url: reconstruct_url(request),
        timestamp: iso_timestamp(),
    })
}

/// Current time as an ISO-8601 string with millisecond precision
pub fn iso_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Header bytes as latin-1; obs-text (0x80-0xFF) is legal in field values
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn echo_headers(headers: &HeaderMap) -> BTreeMap<String, HeaderValues> {
    let mut echoed = BTreeMap::new();

    for name in headers.keys() {
        let values: Vec<String> = headers
            .get_all(name)
            .iter()
            .map(|value| decode_latin1(value.as_bytes()))
            .collect();

        let values = if *name == SET_COOKIE {
            HeaderValues::Multiple(values)
        } else {
            HeaderValues::Single(values.join(", "))
        };
        echoed.insert(name.as_str().to_string(), values);
    }

    echoed
}

fn resolve_origin(request: &RequestDescriptor) -> &str {
    request
        .client_ip
        .as_deref()
        .or(request.remote_addr.as_deref())
        .unwrap_or(UNKNOWN_ORIGIN)
}

/// Query pairs as a map, repeated keys collected into arrays, with
/// [`URI_ARGUMENT`] always set to `path`
pub fn merge_arguments(query: &[(String, String)], path: &str) -> Map<String, Value> {
    let mut arguments = pairs_to_object(query.iter().cloned());
    arguments.insert(URI_ARGUMENT.to_string(), Value::String(path.to_string()));
    arguments
}

fn reconstruct_url(request: &RequestDescriptor) -> String {
    let host = request
        .host
        .as_deref()
        .filter(|host| !host.is_empty())
        .unwrap_or(DEFAULT_HOST);
    format!("{}://{}{}", request.protocol, host, request.original_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderValue, Method};
    use serde_json::json;

    fn descriptor(target: &str) -> RequestDescriptor {
        RequestDescriptor::new(Method::GET, target)
    }

    #[test]
    fn test_arguments_without_query() {
        let echo = build_request_echo(&descriptor("/echo")).unwrap();
        assert_eq!(Value::Object(echo.arguments), json!({ "uri": "/echo" }));
    }

    #[test]
    fn test_arguments_include_query_and_uri() {
        let echo = build_request_echo(&descriptor("/echo?param=test&n=1")).unwrap();
        assert_eq!(
            Value::Object(echo.arguments),
            json!({ "param": "test", "n": "1", "uri": "/echo" })
        );
    }

    #[test]
    fn test_uri_argument_cannot_be_overridden() {
        let echo = build_request_echo(&descriptor("/echo?uri=/elsewhere")).unwrap();
        assert_eq!(echo.arguments["uri"], "/echo");
    }

    #[test]
    fn test_repeated_query_keys_become_arrays() {
        let echo = build_request_echo(&descriptor("/echo?tag=a&tag=b&tag=c")).unwrap();
        assert_eq!(echo.arguments["tag"], json!(["a", "b", "c"]));
    }

    #[test]
    fn test_origin_prefers_client_ip() {
        let mut request = descriptor("/echo");
        request.client_ip = Some("10.0.0.1".into());
        request.remote_addr = Some("127.0.0.1".into());
        assert_eq!(build_request_echo(&request).unwrap().origin, "10.0.0.1");
    }

    #[test]
    fn test_origin_falls_back_to_remote_addr() {
        let mut request = descriptor("/echo");
        request.remote_addr = Some("::1".into());
        assert_eq!(build_request_echo(&request).unwrap().origin, "::1");
    }

    #[test]
    fn test_origin_unknown_without_addresses() {
        assert_eq!(build_request_echo(&descriptor("/echo")).unwrap().origin, UNKNOWN_ORIGIN);
    }

    #[test]
    fn test_forwarded_header_not_used_for_origin() {
        let mut request = descriptor("/echo");
        request.remote_addr = Some("127.0.0.1".into());
        request
            .headers
            .insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));
        let echo = build_request_echo(&request).unwrap();
        assert_eq!(echo.origin, "127.0.0.1");
        assert_eq!(
            echo.headers["x-forwarded-for"],
            HeaderValues::Single("203.0.113.9".into())
        );
    }

    #[test]
    fn test_url_defaults_to_localhost() {
        let echo = build_request_echo(&descriptor("/echo?a=1")).unwrap();
        assert_eq!(echo.url, "http://localhost/echo?a=1");
    }

    #[test]
    fn test_url_uses_host_and_original_target() {
        let mut request = descriptor("/echo?a=%20b");
        request.host = Some("example.com:8080".into());
        request.protocol = "https".into();
        let echo = build_request_echo(&request).unwrap();
        assert_eq!(echo.url, "https://example.com:8080/echo?a=%20b");
        assert_eq!(echo.uri, "/echo");
    }

    #[test]
    fn test_repeated_headers() {
        let mut request = descriptor("/echo");
        request.headers.append("accept", HeaderValue::from_static("text/html"));
        request.headers.append("accept", HeaderValue::from_static("application/json"));
        request.headers.append("set-cookie", HeaderValue::from_static("a=1"));
        let echo = build_request_echo(&request).unwrap();
        assert_eq!(
            echo.headers["accept"],
            HeaderValues::Single("text/html, application/json".into())
        );
        assert_eq!(echo.headers["set-cookie"], HeaderValues::Multiple(vec!["a=1".into()]));
    }

    #[test]
    fn test_obs_text_header_decoded_as_latin1() {
        let mut request = descriptor("/echo");
        request
            .headers
            .insert("x-name", HeaderValue::from_bytes(b"caf\xe9").unwrap());
        let echo = build_request_echo(&request).unwrap();
        assert_eq!(echo.headers["x-name"], HeaderValues::Single("café".into()));
    }

    #[test]
    fn test_unrooted_path_fails() {
        let mut request = descriptor("/echo");
        request.path = "echo".into();
        let err = build_request_echo(&request).unwrap_err();
        assert!(matches!(err, EchoError::MalformedRequest(msg) if msg.contains("\"echo\"")));
    }

    #[test]
    fn test_absolute_form_url_not_duplicated() {
        let mut request = descriptor("http://example.com/echo?x=1");
        request.host = Some("example.com".into());
        let echo = build_request_echo(&request).unwrap();
        assert_eq!(echo.url, "http://example.com/echo?x=1");
        assert_eq!(echo.uri, "/echo");
        assert_eq!(echo.arguments["x"], "1");
    }

    #[test]
    fn test_bracket_query_arguments() {
        let echo = build_request_echo(&descriptor("/echo?a[]=1&a[]=2&o[k]=v")).unwrap();
        assert_eq!(
            Value::Object(echo.arguments),
            json!({ "a": ["1", "2"], "o": { "k": "v" }, "uri": "/echo" })
        );
    }

    #[test]
    fn test_method_body_and_timestamp() {
        let mut request = RequestDescriptor::new(Method::POST, "/echo");
        request.body = json!({ "test": "data" });
        let echo = build_request_echo(&request).unwrap();
        assert_eq!(echo.method, "POST");
        assert_eq!(echo.body, json!({ "test": "data" }));
        assert!(chrono::DateTime::parse_from_rfc3339(&echo.timestamp).is_ok());
        assert!(echo.timestamp.ends_with('Z'));
    }
}
