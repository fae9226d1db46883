//! HTTP/1.1 host layer for the echo service
//!
//! Frames requests with `httparse`, parses bodies, routes to the echo core
//! and shapes error responses. The core itself lives in [`crate::echo`].

pub mod body;
pub mod client;
pub mod config;
pub mod protocol;
pub mod router;
pub mod server;


pub use client::{ClientConfig, ClientResponse, HttpEchoClient};
pub use config::HttpConfig;
pub use protocol::{HttpProtocolError, HttpRequest, HttpResponse};
pub use router::{ErrorResponse, Router};
pub use server::HttpEchoServer;
