use crate::{EchoError, Result};
use bytes::{Buf, Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, HOST, HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Configuration for the HTTP echo client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timeout for a full request/response exchange
    pub request_timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Maximum response size to prevent memory exhaustion
    pub max_response_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            max_response_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// A response received by [`HttpEchoClient`]
#[derive(Debug, Clone)]
pub struct ClientResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ClientResponse {
    /// Deserializes the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Minimal HTTP/1.1 client speaking to an echo server over one kept-alive
/// connection
pub struct HttpEchoClient {
    stream: TcpStream,
    addr: SocketAddr,
    config: ClientConfig,
    buffer: BytesMut,
}

impl HttpEchoClient {
    pub async fn connect_with_config(addr: SocketAddr, config: ClientConfig) -> Result<Self> {
        let stream = timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| EchoError::Timeout("Connection timeout".to_string()))??;

        Ok(Self {
            stream,
            addr,
            config,
            buffer: BytesMut::with_capacity(8192),
        })
    }

    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::connect_with_config(addr, ClientConfig::default()).await
    }

    pub async fn get(&mut self, target: &str) -> Result<ClientResponse> {
        self.send(Method::GET, target, &[], &[]).await
    }

    /// Sends `body` as `application/json`
    pub async fn post_json(&mut self, target: &str, body: &[u8]) -> Result<ClientResponse> {
        self.send(
            Method::POST,
            target,
            &[("content-type", "application/json")],
            body,
        )
        .await
    }

    /// Sends one request and waits for its response
    ///
    /// A `Host` header for the server address is added unless `headers`
    /// carries one.
    pub async fn send(
        &mut self,
        method: Method,
        target: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<ClientResponse> {
        let mut request = format!("{method} {target} HTTP/1.1\r\n").into_bytes();
        let has_host = headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case(HOST.as_str()));
        if !has_host {
            request.extend_from_slice(format!("host: {}\r\n", self.addr).as_bytes());
        }
        for (name, value) in headers {
            request.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        if !body.is_empty() || method == Method::POST || method == Method::PUT {
            request.extend_from_slice(format!("content-length: {}\r\n", body.len()).as_bytes());
        }
        request.extend_from_slice(b"\r\n");
        request.extend_from_slice(body);

        let omit_body = method == Method::HEAD;
        timeout(self.config.request_timeout, self.exchange(&request, omit_body))
            .await
            .map_err(|_| EchoError::Timeout("Request timeout".to_string()))?
    }

    async fn exchange(&mut self, request: &[u8], omit_body: bool) -> Result<ClientResponse> {
        self.stream.write_all(request).await?;
        self.stream.flush().await?;
        self.read_response(omit_body).await
    }

    async fn read_response(&mut self, omit_body: bool) -> Result<ClientResponse> {
        let (status, headers, head_len) = loop {
            if let Some(parsed) = parse_response_head(&self.buffer[..])? {
                break parsed;
            }
            self.fill().await?;
        };
        self.buffer.advance(head_len);

        let length = if omit_body {
            0
        } else {
            headers
                .get(CONTENT_LENGTH)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<usize>().ok())
                .unwrap_or(0)
        };
        if length > self.config.max_response_size {
            return Err(EchoError::Config(format!(
                "Response too large: {length} bytes, maximum allowed: {} bytes",
                self.config.max_response_size
            )));
        }

        while self.buffer.len() < length {
            self.fill().await?;
        }
        let body = self.buffer.split_to(length).freeze();

        Ok(ClientResponse {
            status,
            headers,
            body,
        })
    }

    async fn fill(&mut self) -> Result<()> {
        let n = self.stream.read_buf(&mut self.buffer).await?;
        if n == 0 {
            return Err(EchoError::Protocol(
                "Connection closed before response completed".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_response_head(buf: &[u8]) -> Result<Option<(StatusCode, HeaderMap, usize)>> {
    let mut headers = [httparse::EMPTY_HEADER; 64];
    let mut response = httparse::Response::new(&mut headers);

    let len = match response.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(e) => return Err(EchoError::Protocol(format!("Failed to parse response: {e}"))),
    };

    let status = response
        .code
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| EchoError::Protocol("Missing status code".to_string()))?;

    let mut header_map = HeaderMap::new();
    for header in response.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|e| EchoError::Protocol(format!("Invalid header name: {e}")))?;
        let value = HeaderValue::from_bytes(header.value)
            .map_err(|e| EchoError::Protocol(format!("Invalid header value: {e}")))?;
        header_map.append(name, value);
    }

    Ok(Some((status, header_map, len)))
}
