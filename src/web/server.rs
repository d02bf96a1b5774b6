//! Web server for FileVault.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;

use crate::config::Config;
use crate::file::FileService;
use crate::{Result, VaultError};

use super::handlers::AppState;
use super::router::{create_health_router, create_router};

/// Web server for the API.
pub struct WebServer {
    /// Server address.
    addr: SocketAddr,
    /// Application state.
    app_state: Arc<AppState>,
    /// Allowed CORS origins.
    cors_origins: Vec<String>,
}

impl WebServer {
    /// Create a new web server.
    pub fn new(config: &Config, files: FileService) -> Result<Self> {
        let addr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|e| {
                VaultError::Config(format!(
                    "invalid server address {}:{}: {e}",
                    config.server.host, config.server.port
                ))
            })?;

        Ok(Self {
            addr,
            app_state: Arc::new(AppState::new(files)),
            cors_origins: config.server.cors_origins.clone(),
        })
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn into_router(self) -> axum::Router {
        create_router(self.app_state, &self.cors_origins)
            .merge(create_health_router())
            // Add gzip compression layer
            .layer(CompressionLayer::new())
    }

    /// Run the web server.
    pub async fn run(self) -> std::result::Result<(), std::io::Error> {
        let addr = self.addr;
        let router = self.into_router();

        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        tracing::info!("Web server listening on http://{}", local_addr);

        axum::serve(listener, router).await
    }

    /// Run the server and return the actual bound address.
    ///
    /// This is useful for testing when binding to port 0.
    pub async fn run_with_addr(self) -> std::result::Result<SocketAddr, std::io::Error> {
        let addr = self.addr;
        let router = self.into_router();

        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        tracing::info!("Web server listening on http://{}", local_addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}
