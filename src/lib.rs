use crate::http::protocol::HttpProtocolError;
use thiserror::Error;

/// Error types for the echoservice library
#[derive(Error, Debug)]
pub enum EchoError {
    /// Socket errors (bind, accept, read, write)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP framing errors while reading a request
    #[error("HTTP error: {0}")]
    Http(#[from] HttpProtocolError),

    /// Malformed or unexpected HTTP traffic seen by the client
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A request descriptor the echo builder cannot represent
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// JSON serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),
}

/// Result type for the echoservice library
pub type Result<T> = std::result::Result<T, EchoError>;

pub mod common;
pub mod echo;
pub mod http;
pub mod security;

// Re-export main types for convenience
pub use common::EchoServerTrait;
pub use echo::{
    EchoResponse, EchoResponseAssembler, HealthCheckResponse, ProcessContext, RequestDescriptor,
    RequestEcho, TimedResult, build_health_status, build_request_echo, measure_execution_time,
};
pub use http::{HttpConfig, HttpEchoClient, HttpEchoServer};
