use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{config::AppConfig, context::AppContext, handlers};

pub struct DastarkhanServer {
    addr: SocketAddr,
    app: Router,
    ctx: Arc<AppContext>,
    shutdown_timeout: Duration,
}

pub fn build_app(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/cache/status", get(handlers::cache_status))
        .route("/menu", get(handlers::list_menu))
        .route("/menu/{id}", get(handlers::menu_detail))
        .route("/ingredients", get(handlers::list_ingredients))
        .route("/ingredients/{id}", get(handlers::ingredient_detail))
        .route("/restaurants", get(handlers::list_restaurants))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = tracing::field::Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .with_state(ctx)
}

pub struct ServerBuilder {
    config: AppConfig,
}

impl ServerBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn build(self) -> anyhow::Result<DastarkhanServer> {
        let ctx = Arc::new(AppContext::build(&self.config).await?);
        Ok(DastarkhanServer {
            addr: self.config.addr(),
            app: build_app(Arc::clone(&ctx)),
            ctx,
            shutdown_timeout: Duration::from_millis(self.config.server.shutdown_timeout_ms),
        })
    }
}

impl DastarkhanServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        // Let detached refreshes finish writing before the process exits
        if tokio::time::timeout(self.shutdown_timeout, self.ctx.cache.shutdown())
            .await
            .is_err()
        {
            tracing::warn!(
                in_flight = self.ctx.cache.deps().refresher.in_flight(),
                "cache refreshes still running at shutdown"
            );
        }
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
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
    tracing::info!("shutdown signal received");
}
