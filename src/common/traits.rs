use crate::Result;
use async_trait::async_trait;

/// Common interface for echo servers
#[async_trait]
pub trait EchoServerTrait {
    /// Starts the echo server and serves connections until shutdown
    async fn run(&self) -> Result<()>;

    /// Returns a shutdown signal sender that can be used to gracefully shutdown the server
    fn shutdown_signal(&self) -> tokio::sync::broadcast::Sender<()>;
}
