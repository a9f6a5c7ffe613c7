use std::sync::Arc;

use secrecy::Secret;

use {
    pagehook_config::WebhookConfig,
    pagehook_webhook::{EventDispatcher, SignatureVerifier},
};

#[cfg(feature = "prometheus")]
use pagehook_metrics::MetricsHandle;

/// Everything the webhook routes need, shared across requests.
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<SignatureVerifier>,
    pub verify_token: Arc<Secret<String>>,
    pub dispatcher: Arc<EventDispatcher>,
    #[cfg(feature = "prometheus")]
    pub metrics_handle: Option<MetricsHandle>,
}

impl AppState {
    pub fn new(
        verifier: SignatureVerifier,
        verify_token: Secret<String>,
        dispatcher: EventDispatcher,
    ) -> Self {
        Self {
            verifier: Arc::new(verifier),
            verify_token: Arc::new(verify_token),
            dispatcher: Arc::new(dispatcher),
            #[cfg(feature = "prometheus")]
            metrics_handle: None,
        }
    }

    /// State for the configured secret, token and signature algorithm.
    pub fn from_config(config: &WebhookConfig, dispatcher: EventDispatcher) -> Self {
        Self::new(
            SignatureVerifier::new(config.signature_algorithm, config.app_secret.clone()),
            config.verify_token.clone(),
            dispatcher,
        )
    }

    #[cfg(feature = "prometheus")]
    pub fn with_metrics_handle(mut self, handle: MetricsHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
