use std::time::Duration;

#[cfg(feature = "metrics")]
use std::time::Instant;

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use pagehook_metrics::{counter, histogram, labels, send_api as send_api_metrics};

use {
    pagehook_config::{NotificationType, SendApiConfig},
    pagehook_webhook::{ReplySender, SendError, SendReceipt, SenderAction},
};

/// Client for the Graph `me/messages` endpoint.
#[derive(Clone)]
pub struct GraphSendApi {
    http: reqwest::Client,
    endpoint: String,
    page_access_token: Secret<String>,
    notification_type: NotificationType,
}

impl std::fmt::Debug for GraphSendApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphSendApi")
            .field("endpoint", &self.endpoint)
            .field("page_access_token", &"[REDACTED]")
            .field("notification_type", &self.notification_type)
            .finish()
    }
}

/// Success body: `{"recipient_id": "...", "message_id": "..."}`.
#[derive(Debug, Default, Deserialize)]
struct SendResponse {
    #[serde(default)]
    recipient_id: Option<String>,
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    error: Option<GraphError>,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: i64,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    fbtrace_id: Option<String>,
}

impl GraphSendApi {
    pub fn new(
        http: reqwest::Client,
        api_url: &str,
        page_access_token: Secret<String>,
        notification_type: NotificationType,
    ) -> Self {
        let base = api_url.trim_end_matches('/');
        Self {
            http,
            endpoint: format!("{base}/me/messages"),
            page_access_token,
            notification_type,
        }
    }

    /// Build from config. `Ok(None)` when no page access token is set.
    pub fn from_config(config: &SendApiConfig) -> Result<Option<Self>, SendError> {
        let Some(token) = &config.page_access_token else {
            return Ok(None);
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SendError::external("failed to build HTTP client", e))?;
        Ok(Some(Self::new(
            http,
            &config.api_url,
            token.clone(),
            config.notification_type,
        )))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(
        &self,
        operation: &'static str,
        body: serde_json::Value,
    ) -> Result<SendResponse, SendError> {
        #[cfg(feature = "metrics")]
        let started = Instant::now();

        let result = self.post_inner(body).await;

        #[cfg(feature = "metrics")]
        {
            let success = if result.is_ok() { "true" } else { "false" };
            counter!(
                send_api_metrics::REQUESTS_TOTAL,
                labels::OPERATION => operation,
                labels::SUCCESS => success
            )
            .increment(1);
            histogram!(send_api_metrics::REQUEST_DURATION_SECONDS, labels::OPERATION => operation)
                .record(started.elapsed().as_secs_f64());
        }

        if let Err(e) = &result {
            warn!(operation, error = %e, "send API call failed");
        }
        result
    }

    async fn post_inner(&self, body: serde_json::Value) -> Result<SendResponse, SendError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .query(&[("access_token", self.page_access_token.expose_secret())])
            .json(&body)
            .send()
            .await
            .map_err(|e| SendError::external("send API request failed", e.without_url()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| {
                SendError::external("failed to read send API response", e.without_url())
            })?;
        let parsed: Option<SendResponse> = serde_json::from_str(&text).ok();

        if let Some(error) = parsed.as_ref().and_then(|p| p.error.as_ref()) {
            debug!(
                code = error.code,
                kind = error.kind.as_deref(),
                fbtrace_id = error.fbtrace_id.as_deref(),
                "send API returned an error object"
            );
            return Err(SendError::Api {
                code: error.code,
                message: error.message.clone(),
            });
        }

        if !status.is_success() {
            return Err(SendError::Api {
                code: i64::from(status.as_u16()),
                message: text,
            });
        }

        Ok(parsed.unwrap_or_default())
    }
}

#[async_trait]
impl ReplySender for GraphSendApi {
    async fn send_reply(
        &self,
        recipient_id: &str,
        message: &serde_json::Value,
    ) -> Result<SendReceipt, SendError> {
        let body = serde_json::json!({
            "recipient": { "id": recipient_id },
            "message": message,
            "notification_type": self.notification_type.as_str(),
        });
        let resp = self.post("message", body).await?;
        debug!(
            recipient_id,
            message_id = resp.message_id.as_deref(),
            "sent message"
        );
        Ok(SendReceipt {
            recipient_id: resp.recipient_id.unwrap_or_else(|| recipient_id.to_string()),
            message_id: resp.message_id,
        })
    }

    async fn send_sender_action(
        &self,
        recipient_id: &str,
        action: SenderAction,
    ) -> Result<(), SendError> {
        let body = serde_json::json!({
            "recipient": { "id": recipient_id },
            "sender_action": action.as_str(),
        });
        self.post("sender_action", body).await?;
        debug!(recipient_id, action = action.as_str(), "sent sender action");
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        mockito::Matcher,
        pagehook_webhook::{ReplyBinder, SenderBinder},
        std::sync::Arc,
    };

    fn client(server: &mockito::Server, notification_type: NotificationType) -> GraphSendApi {
        GraphSendApi::new(
            reqwest::Client::new(),
            &format!("{}/", server.url()),
            Secret::new("PAGE_TOKEN".into()),
            notification_type,
        )
    }

    fn messages_path() -> Matcher {
        Matcher::Regex(r"^/me/messages".into())
    }

    #[tokio::test]
    async fn sends_text_reply() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", messages_path())
            .match_query(Matcher::UrlEncoded(
                "access_token".into(),
                "PAGE_TOKEN".into(),
            ))
            .match_body(Matcher::Json(serde_json::json!({
                "recipient": {"id": "USER"},
                "message": {"text": "hello"},
                "notification_type": "SILENT_PUSH"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"recipient_id":"USER","message_id":"mid.1"}"#)
            .create_async()
            .await;

        let api = client(&server, NotificationType::SilentPush);
        let receipt = api
            .send_reply("USER", &serde_json::json!({"text": "hello"}))
            .await
            .unwrap();

        assert_eq!(receipt, SendReceipt {
            recipient_id: "USER".into(),
            message_id: Some("mid.1".into()),
        });
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn sends_sender_action_through_reply_channel() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", messages_path())
            .match_body(Matcher::Json(serde_json::json!({
                "recipient": {"id": "USER"},
                "sender_action": "mark_seen"
            })))
            .with_status(200)
            .with_body(r#"{"recipient_id":"USER"}"#)
            .create_async()
            .await;

        let binder = SenderBinder::new(Arc::new(client(&server, NotificationType::Regular)));
        binder.bind("USER").mark_seen().await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn graph_error_object_is_an_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", messages_path())
            .with_status(400)
            .with_body(
                serde_json::json!({
                    "error": {
                        "message": "(#100) No matching user found",
                        "type": "OAuthException",
                        "code": 100,
                        "fbtrace_id": "abc"
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let err = client(&server, NotificationType::Regular)
            .send_reply("NOBODY", &serde_json::json!({"text": "hi"}))
            .await
            .unwrap_err();
        match err {
            SendError::Api { code, message } => {
                assert_eq!(code, 100);
                assert!(message.contains("No matching user"));
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn non_json_failure_uses_http_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", messages_path())
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let err = client(&server, NotificationType::Regular)
            .send_sender_action("USER", SenderAction::TypingOn)
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::Api { code: 502, ref message } if message == "bad gateway"));
    }

    #[tokio::test]
    async fn unreachable_server_is_external_error() {
        let api = GraphSendApi::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9/",
            Secret::new("t".into()),
            NotificationType::Regular,
        );
        let err = api
            .send_sender_action("USER", SenderAction::TypingOff)
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::External { .. }));
    }

    #[tokio::test]
    async fn transport_error_does_not_render_token() {
        let api = GraphSendApi::new(
            reqwest::Client::new(),
            "http://127.0.0.1:1/",
            Secret::new("PAGE_TOKEN_VALUE".into()),
            NotificationType::Regular,
        );
        let err = api
            .send_reply("USER", &serde_json::json!({"text": "hi"}))
            .await
            .unwrap_err();

        assert!(matches!(err, SendError::External { .. }));
        let rendered = format!("{err} {err:?}");
        assert!(!rendered.contains("PAGE_TOKEN_VALUE"), "{rendered}");
        assert!(!rendered.contains("access_token"), "{rendered}");
    }

    #[test]
    fn from_config_requires_token() {
        let config = SendApiConfig::default();
        assert!(GraphSendApi::from_config(&config).unwrap().is_none());

        let config = SendApiConfig {
            page_access_token: Some(Secret::new("tok".into())),
            api_url: "https://graph.example.com/v2.6".into(),
            ..SendApiConfig::default()
        };
        let api = GraphSendApi::from_config(&config).unwrap().unwrap();
        assert_eq!(api.endpoint(), "https://graph.example.com/v2.6/me/messages");
        assert!(!format!("{api:?}").contains("tok"));
    }
}
