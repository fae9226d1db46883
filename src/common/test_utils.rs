use crate::common::EchoServerTrait;
use crate::echo::ProcessContext;
use crate::http::{HttpConfig, HttpEchoServer};
use crate::{EchoError, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// A server started by [`spawn_test_server`]
pub struct TestServer {
    pub addr: SocketAddr,
    pub handle: JoinHandle<Result<()>>,
    pub shutdown: broadcast::Sender<()>,
}

impl TestServer {
    /// Signals shutdown and waits for the server task to finish
    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown.send(());
        self.handle
            .await
            .map_err(|e| EchoError::Config(format!("Server task failed: {e}")))?
    }
}

/// Starts an HTTP echo server on an ephemeral loopback port for tests
///
/// The listener is bound before the server task starts, so the returned
/// address accepts connections immediately.
pub async fn spawn_test_server(context: ProcessContext) -> Result<TestServer> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| EchoError::Config(format!("Failed to bind listener: {e}")))?;
    let addr = listener
        .local_addr()
        .map_err(|e| EchoError::Config(format!("Failed to get local address: {e}")))?;

    let server = HttpEchoServer::with_context(HttpConfig::bound_to(addr), Arc::new(context));
    let shutdown = server.shutdown_signal();
    let handle = tokio::spawn(async move { server.run_with_listener(listener).await });

    Ok(TestServer {
        addr,
        handle,
        shutdown,
    })
}
