//! Accept loop: binds, serves connections, hands requests to the handler.

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::handler::McpHttpHandler;
use crate::ServerConfig;
use wisp_mcp_server::ServerCore;

pub struct HttpMcpServer {
    handler: Arc<McpHttpHandler>,
    config: ServerConfig,
}

impl HttpMcpServer {
    pub fn new(core: Arc<ServerCore>, config: ServerConfig) -> Self {
        Self {
            handler: Arc::new(McpHttpHandler::new(core, config.clone())),
            config,
        }
    }

    pub fn handler(&self) -> Arc<McpHttpHandler> {
        self.handler.clone()
    }

    /// Bind and serve until the task is aborted.
    pub async fn serve(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        info!("MCP server listening on {}", self.config.bind_addr);

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    error!("accept failed: {}", err);
                    continue;
                }
            };
            debug!(%peer, "connection accepted");

            let handler = self.handler.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let handler = handler.clone();
                    async move { Ok::<_, std::convert::Infallible>(handler.handle(req).await) }
                });
                if let Err(err) = Builder::new(TokioExecutor::new())
                    .serve_connection(io, service)
                    .await
                {
                    debug!(%peer, "connection closed: {}", err);
                }
            });
        }
    }
}
