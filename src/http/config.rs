use crate::security::ResourceLimits;
use std::net::SocketAddr;
use std::time::Duration;

/// Port used when none is configured
pub const DEFAULT_PORT: u16 = 3000;

/// Configuration for the HTTP echo server
///
/// # Examples
///
/// ```rust
/// use echoservice::http::HttpConfig;
/// use echoservice::security::ResourceLimits;
/// use std::time::Duration;
///
/// let config = HttpConfig {
///     bind_addr: "127.0.0.1:8080".parse().unwrap(),
///     read_timeout: Duration::from_secs(30),
///     write_timeout: Duration::from_secs(30),
///     buffer_size: 8192,
///     server_name: Some("EchoService/0.1".to_string()),
///     trust_proxy: false,
///     limits: ResourceLimits {
///         max_body_size: 1024 * 1024,
///         ..Default::default()
///     },
/// };
/// ```
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Network address to bind to
    pub bind_addr: SocketAddr,
    /// Time allowed for a full request to arrive
    pub read_timeout: Duration,
    /// Time allowed for a response to be written
    pub write_timeout: Duration,
    /// Initial read buffer capacity per connection
    pub buffer_size: usize,
    /// Value of the `Server` response header (optional)
    pub server_name: Option<String>,
    /// Take client address, scheme and host from `X-Forwarded-*` headers
    pub trust_proxy: bool,
    /// Size and connection limits
    pub limits: ResourceLimits,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            buffer_size: 8192,
            server_name: Some(format!("EchoService/{}", env!("CARGO_PKG_VERSION"))),
            trust_proxy: false,
            limits: ResourceLimits::default(),
        }
    }
}

impl HttpConfig {
    /// Default configuration bound to `addr`
    pub fn bound_to(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }
}
