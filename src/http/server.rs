use super::config::HttpConfig;
use super::protocol::{HttpProtocolError, read_request, write_response};
use super::router::{Router, protocol_error_response};
use crate::common::EchoServerTrait;
use crate::echo::ProcessContext;
use crate::security::ConnectionTracker;
use crate::{EchoError, Result};
use async_trait::async_trait;
use bytes::BytesMut;
use http::Method;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::{signal, time::timeout};
use tracing::{Instrument, error, info, warn};

/// HTTP echo server
///
/// # Examples
///
/// Server with graceful shutdown:
///
/// ```no_run
/// use echoservice::http::{HttpConfig, HttpEchoServer};
/// use echoservice::common::EchoServerTrait;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = HttpEchoServer::new(HttpConfig::bound_to("127.0.0.1:3000".parse()?));
///     let shutdown_signal = server.shutdown_signal();
///
///     let server_handle = tokio::spawn(async move { server.run().await });
///
///     // Do other work...
///
///     let _ = shutdown_signal.send(());
///     server_handle.await??;
///     Ok(())
/// }
/// ```
pub struct HttpEchoServer {
    config: HttpConfig,
    router: Arc<Router>,
    tracker: Arc<ConnectionTracker>,
    shutdown_signal: Arc<tokio::sync::broadcast::Sender<()>>,
}

impl HttpEchoServer {
    /// Creates a server reporting the current process
    pub fn new(config: HttpConfig) -> Self {
        Self::with_context(config, Arc::new(ProcessContext::capture()))
    }

    /// Creates a server reporting the given process context
    pub fn with_context(config: HttpConfig, context: Arc<ProcessContext>) -> Self {
        let (shutdown_signal, _) = tokio::sync::broadcast::channel(1);
        Self {
            router: Arc::new(Router::new(context, config.trust_proxy)),
            tracker: Arc::new(ConnectionTracker::new(
                config.limits.max_concurrent_connections,
            )),
            config,
            shutdown_signal: Arc::new(shutdown_signal),
        }
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Serves connections from an already bound listener until shutdown
    pub async fn run_with_listener(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "HTTP echo server listening");

        let mut shutdown_rx = self.shutdown_signal.subscribe();

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => self.spawn_connection(stream, addr),
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = signal::ctrl_c() => {
                    info!("Received shutdown signal, stopping server");
                    break;
                }
                _ = shutdown_rx.recv() => {
                    info!("Received internal shutdown signal, stopping server");
                    break;
                }
            }
        }

        info!("HTTP echo server stopped");
        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let guard = match self.tracker.try_acquire() {
            Ok(guard) => guard,
            Err(e) => {
                warn!(%addr, error = %e, "Connection rejected");
                return;
            }
        };

        let current = guard.active_connections();
        info!(%addr, current, "Accepted connection");

        let config = self.config.clone();
        let router = Arc::clone(&self.router);
        let span = tracing::info_span!("connection", %addr);

        tokio::spawn(
            async move {
                if let Err(e) = Self::handle_connection(stream, addr, config, router).await {
                    match e {
                        EchoError::Http(_) => warn!(%addr, error = %e, "Rejected request"),
                        _ => error!(%addr, error = %e, "Error handling connection"),
                    }
                }
                drop(guard);
                info!(%addr, "Connection closed");
            }
            .instrument(span),
        );
    }

    /// Serves requests on one connection until it closes or stops keeping alive
    async fn handle_connection(
        mut stream: TcpStream,
        addr: SocketAddr,
        config: HttpConfig,
        router: Arc<Router>,
    ) -> Result<()> {
        let mut buffer = BytesMut::with_capacity(config.buffer_size);
        let mut served = 0usize;

        loop {
            // Idle keep-alive connections get the shorter idle limit
            let wait = if served == 0 || !buffer.is_empty() {
                config.read_timeout
            } else {
                config.limits.max_idle_time
            };

            let read_result =
                timeout(wait, read_request(&mut stream, &mut buffer, &config.limits)).await;
            let request = match read_result {
                Ok(Ok(Some(request))) => request,
                Ok(Ok(None)) => {
                    info!(%addr, "Client closed connection");
                    break;
                }
                Ok(Err(e)) => {
                    Self::reject(&mut stream, &config, &e).await;
                    return Err(e.into());
                }
                Err(_) => {
                    if served == 0 {
                        warn!(%addr, "Read timeout");
                    }
                    break;
                }
            };

            let started = Instant::now();
            let keep_alive = request.keep_alive();
            let response = router.handle(&request, Some(addr));
            let encoded = response.encode(
                config.server_name.as_deref(),
                keep_alive,
                request.method == Method::HEAD,
            );

            info!(
                method = %request.method,
                url = %request.target,
                status = response.status.as_u16(),
                elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
                "Handled request"
            );

            match timeout(config.write_timeout, write_response(&mut stream, &encoded)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    warn!(%addr, "Write timeout");
                    break;
                }
            }

            served += 1;
            if !keep_alive {
                break;
            }
        }

        Ok(())
    }

    /// Sends the error response for a request that could not be read
    async fn reject(stream: &mut TcpStream, config: &HttpConfig, err: &HttpProtocolError) {
        let Some(response) = protocol_error_response(err) else {
            return;
        };
        let encoded = response.encode(config.server_name.as_deref(), false, false);
        if let Ok(Err(e)) = timeout(config.write_timeout, write_response(stream, &encoded)).await {
            warn!(error = %e, "Failed to send error response");
        }
    }
}

#[async_trait]
impl EchoServerTrait for HttpEchoServer {
    /// Binds the configured address and serves connections until shutdown
    async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.run_with_listener(listener).await
    }

    /// Returns a shutdown signal sender that can be used to gracefully shutdown the server
    fn shutdown_signal(&self) -> tokio::sync::broadcast::Sender<()> {
        self.shutdown_signal.as_ref().clone()
    }
}
