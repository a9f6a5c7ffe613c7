use std::{path::Path, sync::Arc};

use {
    anyhow::{Context, Result, bail},
    tracing::{info, warn},
};

use {
    pagehook_config::{PagehookConfig, discover_and_load, validate_config},
    pagehook_gateway::{AppState, start_gateway},
    pagehook_send_api::GraphSendApi,
    pagehook_webhook::{
        EventDispatcher, LoggingHandler, Precedence, SenderBinder, SubscriptionRegistry,
    },
};

/// `--bind` / `--port` values that win over the config file.
#[derive(Debug, Default)]
pub struct ServerOverrides {
    pub bind: Option<String>,
    pub port: Option<u16>,
}

impl ServerOverrides {
    fn apply(self, config: &mut PagehookConfig) {
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
    }
}

pub async fn serve(config_path: Option<&Path>, overrides: ServerOverrides) -> Result<()> {
    let (mut config, path) = discover_and_load(config_path).context("failed to load config")?;
    overrides.apply(&mut config);

    let result = validate_config(&config);
    for d in &result.diagnostics {
        warn!(path = d.path, category = d.category, "{}", d.message);
    }
    if result.has_errors() {
        let errors: Vec<String> = result.errors().map(ToString::to_string).collect();
        bail!(
            "invalid configuration{}:\n  {}",
            path.map(|p| format!(" in {}", p.display()))
                .unwrap_or_default(),
            errors.join("\n  ")
        );
    }

    let dispatcher = build_dispatcher(&config)?;
    let state = AppState::from_config(&config.webhook, dispatcher);

    #[cfg(feature = "prometheus")]
    let state = if config.metrics.enabled {
        let handle = pagehook_metrics::init_metrics(pagehook_metrics::MetricsRecorderConfig {
            enabled: true,
            global_labels: Vec::new(),
        })?;
        state.with_metrics_handle(handle)
    } else {
        state
    };

    start_gateway(&config, state).await
}

/// Registry, reply transport and precedence from config.
pub fn build_dispatcher(config: &PagehookConfig) -> Result<EventDispatcher> {
    let mut registry = SubscriptionRegistry::new();
    if config.webhook.log_events {
        LoggingHandler::register(&mut registry);
    }

    let binder = match GraphSendApi::from_config(&config.send_api)? {
        Some(api) => {
            info!(endpoint = api.endpoint(), "send API enabled");
            SenderBinder::new(Arc::new(api))
        },
        None => SenderBinder::disabled(),
    };

    Ok(EventDispatcher::new(registry, Arc::new(binder))
        .with_precedence(Precedence::from(config.webhook.precedence)))
}
