//! Application startup and lifecycle management.

use crate::config::{PersonConfig, StorageBackend};
use crate::handlers::{
    flux_persons, health_check, metrics_endpoint, readiness_check, rx_persons, stream_persons,
};
use crate::services::{
    InMemoryPersonRepository, MongoPersonRepository, PersonGenerator, PersonRepository,
};
use axum::{middleware, routing::get, Router};
use service_core::error::AppError;
use service_core::middleware::{metrics_middleware, request_id_middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn PersonRepository>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(flux_persons))
        .route("/rx", get(rx_persons))
        .route("/stream", get(stream_persons))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_endpoint))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the repository for the configured backend.
pub async fn build_repository(
    config: &PersonConfig,
) -> Result<Arc<dyn PersonRepository>, AppError> {
    match config.storage.backend {
        StorageBackend::Mongodb => {
            let repo = MongoPersonRepository::connect(&config.mongodb, &config.storage).await?;
            repo.ensure_capped_collection().await.map_err(|e| {
                tracing::error!("Failed to prepare capped collection: {}", e);
                e
            })?;
            Ok(Arc::new(repo))
        }
        StorageBackend::Memory => {
            tracing::info!("Using in-memory person store");
            Ok(Arc::new(InMemoryPersonRepository::new(
                config.storage.max_documents,
                config.storage.size_bytes,
            )))
        }
    }
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
    config: PersonConfig,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: PersonConfig) -> Result<Self, AppError> {
        let repository = build_repository(&config).await?;
        Self::with_repository(config, repository).await
    }

    /// Build around an existing repository.
    pub async fn with_repository(
        config: PersonConfig,
        repository: Arc<dyn PersonRepository>,
    ) -> Result<Self, AppError> {
        // Port 0 binds a random port for testing
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            port,
            backend = %config.storage.backend,
            "Person service listening"
        );

        Ok(Self {
            port,
            listener,
            state: AppState { repository },
            config,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn repository(&self) -> Arc<dyn PersonRepository> {
        self.state.repository.clone()
    }

    /// Run until a shutdown signal arrives.
    ///
    /// Starts the person generator (when enabled) alongside the HTTP server.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let shutdown = CancellationToken::new();

        let generator = if self.config.generator.enabled {
            let generator = PersonGenerator::new(
                self.state.repository.clone(),
                self.config.generator.interval(),
            );
            Some(tokio::spawn(generator.run(shutdown.clone())))
        } else {
            tracing::info!("Person generator disabled by configuration");
            None
        };

        // Tail streams never complete, so the server is dropped rather than drained.
        let result = tokio::select! {
            result = axum::serve(self.listener, router(self.state)) => result,
            _ = shutdown_signal() => Ok(()),
        };

        shutdown.cancel();
        if let Some(handle) = generator {
            let _ = handle.await;
        }

        result.map_err(|e| {
            tracing::error!("HTTP server error: {}", e);
            e
        })
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
