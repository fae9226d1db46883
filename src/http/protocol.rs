use crate::security::{ResourceLimits, SizeError};
use bytes::{Buf, Bytes, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HeaderName, HeaderValue, SERVER};
use http::{HeaderMap, Method, StatusCode, Version};
use serde::Serialize;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum number of request headers accepted
pub const MAX_HEADERS: usize = 64;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

#[derive(Debug, thiserror::Error)]
pub enum HttpProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("HTTP parsing error: {0}")]
    HttpParse(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Incomplete request")]
    IncompleteRequest,
    #[error("Request headers too large: {0}")]
    HeadersTooLarge(SizeError),
    #[error("Request body too large: {0}")]
    PayloadTooLarge(SizeError),
    #[error("Unsupported transfer encoding: {0}")]
    UnsupportedTransferEncoding(String),
}

/// A fully read HTTP/1.x request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Request target exactly as received
    pub target: String,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpRequest {
    /// Whether the connection may serve another request after this one
    pub fn keep_alive(&self) -> bool {
        let connection = self
            .headers
            .get(CONNECTION)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_ascii_lowercase());

        match connection.as_deref() {
            Some(value) if value.split(',').any(|token| token.trim() == "close") => false,
            Some(value) if value.split(',').any(|token| token.trim() == "keep-alive") => true,
            _ => self.version == Version::HTTP_11,
        }
    }
}

struct RequestHead {
    method: Method,
    target: String,
    version: Version,
    headers: HeaderMap,
    len: usize,
}

fn parse_head(buf: &[u8]) -> Result<Option<RequestHead>, HttpProtocolError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);

    let len = match req.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(e) => {
            return Err(HttpProtocolError::HttpParse(format!(
                "Failed to parse headers: {e}"
            )));
        }
    };

    let method = req
        .method
        .ok_or_else(|| HttpProtocolError::HttpParse("Missing method".to_string()))?;
    let method = Method::from_bytes(method.as_bytes())
        .map_err(|_| HttpProtocolError::InvalidRequest(format!("Invalid method {method}")))?;
    let target = req
        .path
        .ok_or_else(|| HttpProtocolError::HttpParse("Missing request target".to_string()))?
        .to_string();
    let version = match req.version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    };

    let mut header_map = HeaderMap::with_capacity(req.headers.len());
    for header in req.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(|_| {
            HttpProtocolError::InvalidRequest(format!("Invalid header name {}", header.name))
        })?;
        let value = HeaderValue::from_bytes(header.value).map_err(|_| {
            HttpProtocolError::InvalidRequest(format!("Invalid value for header {}", header.name))
        })?;
        header_map.append(name, value);
    }

    Ok(Some(RequestHead {
        method,
        target,
        version,
        headers: header_map,
        len,
    }))
}

fn content_length(headers: &HeaderMap) -> Result<usize, HttpProtocolError> {
    let mut lengths = headers.get_all(CONTENT_LENGTH).iter();
    let Some(first) = lengths.next() else {
        return Ok(0);
    };
    if lengths.any(|other| other != first) {
        return Err(HttpProtocolError::InvalidRequest(
            "Conflicting Content-Length headers".to_string(),
        ));
    }

    first
        .to_str()
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .ok_or_else(|| HttpProtocolError::InvalidRequest("Invalid Content-Length".to_string()))
}

/// Reads one request from `stream`, using `buffer` for bytes that arrive
/// ahead of the current request
///
/// Returns `Ok(None)` when the peer closes the connection cleanly between
/// requests.
pub async fn read_request<S>(
    stream: &mut S,
    buffer: &mut BytesMut,
    limits: &ResourceLimits,
) -> Result<Option<HttpRequest>, HttpProtocolError>
where
    S: AsyncRead + Unpin,
{
    let head = loop {
        if !buffer.is_empty() {
            if let Some(head) = parse_head(&buffer[..])? {
                break head;
            }
            limits
                .check_header_size(buffer.len())
                .map_err(HttpProtocolError::HeadersTooLarge)?;
        }

        let n = stream.read_buf(buffer).await?;
        if n == 0 {
            if buffer.is_empty() {
                return Ok(None);
            }
            return Err(HttpProtocolError::IncompleteRequest);
        }
    };

    limits
        .check_header_size(head.len)
        .map_err(HttpProtocolError::HeadersTooLarge)?;

    if let Some(encoding) = head.headers.get(http::header::TRANSFER_ENCODING) {
        return Err(HttpProtocolError::UnsupportedTransferEncoding(
            String::from_utf8_lossy(encoding.as_bytes()).into_owned(),
        ));
    }

    let length = content_length(&head.headers)?;
    limits
        .check_body_size(length)
        .map_err(HttpProtocolError::PayloadTooLarge)?;

    buffer.advance(head.len);
    while buffer.len() < length {
        let n = stream.read_buf(buffer).await?;
        if n == 0 {
            return Err(HttpProtocolError::IncompleteRequest);
        }
    }
    let body = buffer.split_to(length).freeze();

    Ok(Some(HttpRequest {
        method: head.method,
        target: head.target,
        version: head.version,
        headers: head.headers,
        body,
    }))
}

/// An HTTP response ready to be written
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    /// A response whose body is `value` serialized as JSON
    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> serde_json::Result<Self> {
        let body = serde_json::to_vec(value)?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        Ok(Self {
            status,
            headers,
            body: Bytes::from(body),
        })
    }

    /// Serializes status line, headers and (unless `omit_body`) the body
    pub fn encode(&self, server_name: Option<&str>, keep_alive: bool, omit_body: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(256 + self.body.len());
        out.extend_from_slice(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_str(),
                self.status.canonical_reason().unwrap_or("Unknown")
            )
            .as_bytes(),
        );

        for (name, value) in self.headers.iter() {
            push_header(&mut out, name.as_str(), value.as_bytes());
        }
        if let Some(server_name) = server_name.filter(|_| !self.headers.contains_key(SERVER)) {
            push_header(&mut out, SERVER.as_str(), server_name.as_bytes());
        }
        push_header(
            &mut out,
            CONTENT_LENGTH.as_str(),
            self.body.len().to_string().as_bytes(),
        );
        push_header(
            &mut out,
            CONNECTION.as_str(),
            if keep_alive { &b"keep-alive"[..] } else { &b"close"[..] },
        );
        out.extend_from_slice(b"\r\n");

        if !omit_body {
            out.extend_from_slice(&self.body);
        }
        out
    }
}

fn push_header(out: &mut Vec<u8>, name: &str, value: &[u8]) {
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value);
    out.extend_from_slice(b"\r\n");
}

/// Writes an encoded response and flushes the stream
pub async fn write_response<S>(stream: &mut S, encoded: &[u8]) -> Result<(), HttpProtocolError>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(encoded).await?;
    stream.flush().await?;
    Ok(())
}
