use std::net::SocketAddr;

use {
    anyhow::Context,
    axum::{
        Json, Router,
        extract::State,
        response::IntoResponse,
        routing::get,
    },
    tower_http::trace::TraceLayer,
    tracing::info,
};

use pagehook_config::PagehookConfig;

use crate::{
    routes::{handshake_handler, notification_handler},
    state::AppState,
};

// ── Router ───────────────────────────────────────────────────────────────────

/// Router serving the webhook on `path` plus the operational endpoints.
pub fn build_webhook_app(state: AppState, path: &str) -> Router {
    let router = Router::new()
        .route("/health", get(health_handler))
        .route(path, get(handshake_handler).post(notification_handler));

    #[cfg(feature = "prometheus")]
    let router = router.route(
        "/metrics",
        get(crate::metrics_routes::prometheus_metrics_handler),
    );

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

// ── Server ───────────────────────────────────────────────────────────────────

/// Bind `server.bind:server.port` and serve until Ctrl-C.
pub async fn start_gateway(config: &PagehookConfig, state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid bind address {}:{}",
                config.server.bind, config.server.port
            )
        })?;

    let handlers = state.dispatcher.registry().handler_names();
    let mut lines = vec![
        format!("pagehook v{}", env!("CARGO_PKG_VERSION")),
        format!("listening on http://{addr}{}", config.webhook.path),
        format!(
            "signature: {} ({})",
            config.webhook.signature_algorithm.label(),
            state.verifier.header_name()
        ),
        format!(
            "handlers: {}",
            if handlers.is_empty() {
                "none".to_string()
            } else {
                handlers.join(", ")
            }
        ),
    ];
    if config.send_api.page_access_token.is_none() {
        lines.push("replies disabled: no page access token".into());
    }
    #[cfg(feature = "prometheus")]
    if state.metrics_handle.is_some() {
        lines.push(format!("metrics: http://{addr}/metrics"));
    }
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    let app = build_webhook_app(state, &config.webhook.path);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "signature_algorithm": state.verifier.algorithm().label(),
        "subscriptions": state.dispatcher.registry().len(),
    }))
}
