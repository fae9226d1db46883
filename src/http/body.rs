use crate::echo::request::pairs_to_object;
use http::HeaderMap;
use http::header::CONTENT_TYPE;
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("Invalid JSON format: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    UrlEncoded,
    Other,
}

fn body_kind(headers: &HeaderMap) -> BodyKind {
    let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return BodyKind::Other;
    };
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if essence == "application/json"
        || (essence.starts_with("application/") && essence.ends_with("+json"))
    {
        BodyKind::Json
    } else if essence == "application/x-www-form-urlencoded" {
        BodyKind::UrlEncoded
    } else {
        BodyKind::Other
    }
}

/// Parses a request body according to its `Content-Type`
///
/// JSON bodies are parsed as any JSON value and rejected when malformed;
/// form bodies become an object; everything else, and empty bodies, become
/// `{}`.
pub fn parse_body(headers: &HeaderMap, body: &[u8]) -> Result<Value, BodyError> {
    if body.is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    match body_kind(headers) {
        BodyKind::Json => Ok(serde_json::from_slice(body)?),
        BodyKind::UrlEncoded => {
            let pairs = url::form_urlencoded::parse(body)
                .map(|(key, value)| (key.into_owned(), value.into_owned()));
            Ok(Value::Object(pairs_to_object(pairs)))
        }
        BodyKind::Other => Ok(Value::Object(Map::new())),
    }
}
