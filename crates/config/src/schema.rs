//! Config schema types (server, webhook, send API, metrics).

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PagehookConfig {
    pub server: ServerConfig,
    pub webhook: WebhookConfig,
    pub send_api: SendApiConfig,
    pub metrics: MetricsConfig,
}

/// Gateway listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 5000,
        }
    }
}

/// Inbound webhook configuration.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Route serving both the handshake (GET) and notifications (POST).
    pub path: String,

    /// App secret used to verify the body signature.
    pub app_secret: Secret<String>,

    /// Token the provider echoes during the subscription handshake.
    pub verify_token: Secret<String>,

    pub signature_algorithm: SignatureAlgorithm,

    /// Register the built-in handler that logs every classified event.
    pub log_events: bool,

    pub precedence: PrecedenceConfig,
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("path", &self.path)
            .field("app_secret", &"[REDACTED]")
            .field("verify_token", &"[REDACTED]")
            .field("signature_algorithm", &self.signature_algorithm)
            .field("log_events", &self.log_events)
            .field("precedence", &self.precedence)
            .finish()
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            path: "/webhook".into(),
            app_secret: Secret::new(String::new()),
            verify_token: Secret::new(String::new()),
            signature_algorithm: SignatureAlgorithm::default(),
            log_events: true,
            precedence: PrecedenceConfig::default(),
        }
    }
}

impl WebhookConfig {
    pub fn has_app_secret(&self) -> bool {
        !self.app_secret.expose_secret().is_empty()
    }

    pub fn has_verify_token(&self) -> bool {
        !self.verify_token.expose_secret().is_empty()
    }
}

/// HMAC digest accepted in the signature header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    /// `X-Hub-Signature: sha1=<hex>`
    #[default]
    Sha1,
    /// `X-Hub-Signature-256: sha256=<hex>`
    Sha256,
}

impl SignatureAlgorithm {
    /// Label used on the left side of `<algo>=<hex>`.
    pub fn label(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        if label.eq_ignore_ascii_case("sha1") {
            Some(Self::Sha1)
        } else if label.eq_ignore_ascii_case("sha256") {
            Some(Self::Sha256)
        } else {
            None
        }
    }
}

impl std::fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Tie-breaks for events that populate more than one message field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecedenceConfig {
    /// A message with both a quick reply and text is a quick reply.
    pub quick_reply_over_text: bool,
    /// An echoed message with attachments stays a single echo.
    pub echo_absorbs_attachments: bool,
}

impl Default for PrecedenceConfig {
    fn default() -> Self {
        Self {
            quick_reply_over_text: true,
            echo_absorbs_attachments: true,
        }
    }
}

/// Outbound Send API configuration.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct SendApiConfig {
    /// Graph API base URL, with trailing slash.
    pub api_url: String,

    /// Page access token. Replies are disabled when unset.
    #[serde(deserialize_with = "deserialize_option_secret")]
    pub page_access_token: Option<Secret<String>>,

    pub notification_type: NotificationType,

    pub timeout_secs: u64,
}

impl std::fmt::Debug for SendApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendApiConfig")
            .field("api_url", &self.api_url)
            .field(
                "page_access_token",
                &self.page_access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("notification_type", &self.notification_type)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for SendApiConfig {
    fn default() -> Self {
        Self {
            api_url: "https://graph.facebook.com/v2.6/".into(),
            page_access_token: None,
            notification_type: NotificationType::default(),
            timeout_secs: 10,
        }
    }
}

/// Push notification behaviour for outbound messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    /// Sound or vibration.
    #[default]
    Regular,
    /// On-screen notification only.
    SilentPush,
    /// No notification.
    NoPush,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "REGULAR",
            Self::SilentPush => "SILENT_PUSH",
            Self::NoPush => "NO_PUSH",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

fn deserialize_option_secret<'de, D>(deserializer: D) -> Result<Option<Secret<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.filter(|s| !s.is_empty()).map(Secret::new))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = PagehookConfig::default();
        assert_eq!(cfg.server.port, 5000);
        assert_eq!(cfg.webhook.path, "/webhook");
        assert_eq!(cfg.webhook.signature_algorithm, SignatureAlgorithm::Sha1);
        assert!(cfg.webhook.log_events);
        assert!(cfg.webhook.precedence.quick_reply_over_text);
        assert!(cfg.webhook.precedence.echo_absorbs_attachments);
        assert!(!cfg.webhook.has_app_secret());
        assert_eq!(cfg.send_api.notification_type, NotificationType::Regular);
        assert!(cfg.send_api.page_access_token.is_none());
    }

    #[test]
    fn parses_full_toml() {
        let cfg: PagehookConfig = toml::from_str(
            r#"
            [server]
            bind = "0.0.0.0"
            port = 8080

            [webhook]
            path = "/hooks/messenger"
            app_secret = "s3cret"
            verify_token = "tok"
            signature_algorithm = "sha256"
            log_events = false

            [webhook.precedence]
            quick_reply_over_text = false

            [send_api]
            page_access_token = "EAAB"
            notification_type = "SILENT_PUSH"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.server.bind, "0.0.0.0");
        assert_eq!(cfg.webhook.path, "/hooks/messenger");
        assert_eq!(cfg.webhook.app_secret.expose_secret(), "s3cret");
        assert_eq!(cfg.webhook.signature_algorithm, SignatureAlgorithm::Sha256);
        assert!(!cfg.webhook.precedence.quick_reply_over_text);
        assert!(cfg.webhook.precedence.echo_absorbs_attachments);
        assert_eq!(
            cfg.send_api
                .page_access_token
                .as_ref()
                .map(|t| t.expose_secret().as_str()),
            Some("EAAB")
        );
        assert_eq!(cfg.send_api.notification_type, NotificationType::SilentPush);
        assert_eq!(
            cfg.send_api.api_url, "https://graph.facebook.com/v2.6/",
            "unset fields keep their defaults"
        );
    }

    #[test]
    fn debug_redacts_secrets() {
        let cfg: PagehookConfig = toml::from_str(
            r#"
            [webhook]
            app_secret = "hunter2"
            [send_api]
            page_access_token = "EAAB-secret"
            "#,
        )
        .unwrap();
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("EAAB-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn algorithm_labels() {
        assert_eq!(
            SignatureAlgorithm::from_label("SHA1"),
            Some(SignatureAlgorithm::Sha1)
        );
        assert_eq!(
            SignatureAlgorithm::from_label("sha256"),
            Some(SignatureAlgorithm::Sha256)
        );
        assert_eq!(SignatureAlgorithm::from_label("md5"), None);
        assert_eq!(SignatureAlgorithm::Sha256.to_string(), "sha256");
    }

    #[test]
    fn empty_page_token_is_unset() {
        let cfg: SendApiConfig = toml::from_str(r#"page_access_token = """#).unwrap();
        assert!(cfg.page_access_token.is_none());
    }
}
