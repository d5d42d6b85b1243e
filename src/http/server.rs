//! HTTP server implementation.

use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::middleware::{throttle, ThrottleState};
use crate::error::{GuardError, Result};
use crate::throttle::ThrottlerStorage;

/// HTTP server running a router behind the throttle middleware.
pub struct HttpServer<S: ThrottlerStorage + 'static> {
    /// Address to bind to
    addr: SocketAddr,
    /// Middleware state shared by every request
    state: ThrottleState<S>,
}

impl<S: ThrottlerStorage + 'static> HttpServer<S> {
    pub fn new(addr: SocketAddr, state: ThrottleState<S>) -> Self {
        Self { addr, state }
    }

    /// Wrap `routes` in the throttle middleware.
    pub fn router(&self, routes: Router) -> Router {
        routes.layer(axum::middleware::from_fn_with_state(
            self.state.clone(),
            throttle::<S>,
        ))
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, routes: Router, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = self.router(routes);
        let listener = TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, "Starting HTTP server with graceful shutdown");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            GuardError::Server(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThrottleConfig;
    use crate::http::status_routes;
    use crate::throttle::{MemoryStorage, ThrottlerGuard};
    use std::sync::Arc;

    fn server(addr: SocketAddr) -> HttpServer<MemoryStorage> {
        let config = ThrottleConfig::default();
        let guard = Arc::new(ThrottlerGuard::new(
            config.selector(),
            Arc::new(MemoryStorage::new()),
        ));
        HttpServer::new(addr, ThrottleState::new(guard, &config))
    }

    #[test]
    fn test_server_creation() {
        let addr: SocketAddr = "127.0.0.1:3000".parse().unwrap();
        let _server = server(addr);
    }

    #[tokio::test]
    async fn test_serve_stops_on_signal() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let result = server(addr)
            .serve_with_shutdown(status_routes(), async {})
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_bind_failure_is_io_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let taken = listener.local_addr().unwrap();

        let result = server(taken)
            .serve_with_shutdown(status_routes(), async {})
            .await;
        assert!(matches!(result, Err(GuardError::Io(_))));
    }
}
