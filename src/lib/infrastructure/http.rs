//! HTTP Server

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener},
    time::Duration,
};

use anyhow::Context;
use axum::{extract::Request, routing::get, Router};
use axum_server::Handle;
use clap::Parser;
use handlers::{index, panic_handler, v1};
use tokio::signal;
use tower_http::{catch_panic::CatchPanicLayer, compression::CompressionLayer, trace::TraceLayer};
use tracing::{debug, info, info_span};
use uuid::Uuid;

use crate::domain::delivery::DeliveryService;

pub use state::{AppConfig, AppState};

mod errors;
mod handlers;
mod open_api;
mod state;

/// Configuration for the HTTP server.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
pub struct HttpServerConfig {
    /// The address to bind to
    #[arg(long = "api-host", env = "API_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// The port to listen on
    #[arg(long = "api-port", env = "API_PORT", default_value_t = 8000)]
    pub port: u16,
}

/// The application's HTTP server
#[derive(Debug)]
pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    /// Returns a new HTTP server bound to the address specified in `config`.
    pub fn new<D: DeliveryService>(
        state: AppState<D>,
        config: &HttpServerConfig,
    ) -> anyhow::Result<Self> {
        let address = SocketAddr::from((config.host, config.port));

        let listener = TcpListener::bind(address)
            .with_context(|| format!("failed to listen on {address}"))?;
        listener
            .set_nonblocking(true)
            .context("failed to make the listener non-blocking")?;

        Ok(Self {
            router: router(state),
            listener,
        })
    }

    /// The address the server is bound to
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Runs the HTTP server until a shutdown signal is received.
    #[mutants::skip]
    pub async fn run(self) -> anyhow::Result<()> {
        info!(address = %self.local_addr()?, "listening");

        let handle = Handle::new();

        tokio::spawn(shutdown_signal(handle.clone()));

        axum_server::from_tcp(self.listener)
            .handle(handle)
            .serve(self.router.into_make_service())
            .await
            .context("server error")?;

        Ok(())
    }
}

/// Create the application's router
pub fn router<D: DeliveryService>(state: AppState<D>) -> Router {
    let trace_layer = TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
        let uri = request.uri().to_string();
        let request_id = Uuid::now_v7();

        info_span!("http_request", method = ?request.method(), uri, %request_id)
    });

    Router::new()
        .route("/", get(index::handler))
        .nest("/api/v1", v1::router())
        .layer(CatchPanicLayer::custom(panic_handler))
        .layer(CompressionLayer::new())
        .layer(trace_layer)
        .with_state(state)
}

#[mutants::skip]
async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    debug!("shutting down gracefully");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
