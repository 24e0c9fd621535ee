use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::ProxyConfig;
use crate::history::HistoryRepository;
use crate::proxy::handler::ConnectionHandler;
use crate::{ProxyError, Result};

/// TCP 接入循环：每个连接一个 task，连接之间不共享可变状态
pub struct ProxyServer {
    listener: TcpListener,
    handler: Arc<ConnectionHandler>,
}

impl ProxyServer {
    pub async fn bind(config: &ProxyConfig, repository: Arc<dyn HistoryRepository>) -> Result<Self> {
        let address = config.server.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| ProxyError::Config(format!("Failed to bind {}: {}", address, e)))?;

        let handler = Arc::new(ConnectionHandler::new(config, repository)?);

        tracing::info!(
            address = %listener.local_addr()?,
            storage = %config.storage.dir.display(),
            encoding = %config.encoding,
            "Proxy listening"
        );

        Ok(Self { listener, handler })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until `shutdown` resolves. Connections already
    /// accepted keep running on their own tasks.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(peer = %peer, "Connection accepted");
                        let handler = Arc::clone(&self.handler);
                        tokio::spawn(async move {
                            handler.serve(stream, peer).await;
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to accept connection"),
                }
            }
        }

        Ok(())
    }

    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }
}
