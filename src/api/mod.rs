//! HTTP API server for beacon relay

pub mod health;
pub mod voice;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiServerConfig;
use crate::debug::DebugRecorder;
use crate::pipeline::Pipeline;
use crate::{Config, Result};

/// What the relay is running, reported by `/api/status`
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub persona_id: String,
    pub persona_name: String,
    pub llm_model: String,
    pub stt_backend: String,
    pub tts_backend: String,
}

impl ServiceInfo {
    /// Describe the configured backends
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            persona_id: config.persona.id().to_string(),
            persona_name: config.persona.name().to_string(),
            llm_model: config.llm.model.clone(),
            stt_backend: format!("{:?}", config.stt.backend).to_lowercase(),
            tts_backend: format!("{:?}", config.tts.backend).to_lowercase(),
        }
    }
}

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<Pipeline>,
    pub recorder: Option<DebugRecorder>,
    pub info: ServiceInfo,
}

/// Configuration for building an API server
pub struct ApiServerBuilder {
    pipeline: Arc<Pipeline>,
    info: ServiceInfo,
    port: u16,
    max_body_bytes: usize,
    recorder: Option<DebugRecorder>,
}

impl ApiServerBuilder {
    /// Create a new API server builder
    #[must_use]
    pub fn new(pipeline: Arc<Pipeline>, info: ServiceInfo) -> Self {
        let defaults = ApiServerConfig::default();
        Self {
            pipeline,
            info,
            port: defaults.port,
            max_body_bytes: defaults.max_body_bytes,
            recorder: None,
        }
    }

    /// Set the listening port
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the largest accepted request body
    #[must_use]
    pub fn max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    /// Apply port and body limit from configuration
    #[must_use]
    pub fn server_config(self, config: &ApiServerConfig) -> Self {
        self.port(config.port).max_body_bytes(config.max_body_bytes)
    }

    /// Persist request/response audio
    #[must_use]
    pub fn debug_recorder(mut self, recorder: Option<DebugRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        let state = Arc::new(ApiState {
            pipeline: self.pipeline,
            recorder: self.recorder,
            info: self.info,
        });

        ApiServer {
            state,
            port: self.port,
            max_body_bytes: self.max_body_bytes,
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
    max_body_bytes: usize,
}

impl ApiServer {
    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        let router = Router::new()
            .merge(voice::router(self.state.clone()))
            .merge(health::router())
            .merge(health::status_router(self.state.clone()))
            .layer(DefaultBodyLimit::max(self.max_body_bytes));

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(
            port = self.port,
            persona = %self.state.info.persona_id,
            debug_audio = self.state.recorder.is_some(),
            "API server listening"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
