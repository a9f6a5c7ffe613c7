//! Reply capability handed to event handlers.
//!
//! The dispatcher binds a [`ReplyChannel`] to the sender of every event.
//! The channel forwards to a [`ReplySender`], normally the Graph Send API
//! client, which can be swapped out in tests.

use std::{sync::Arc, time::Duration};

use {async_trait::async_trait, tracing::debug};

use crate::error::{Result, SendError};

/// Typing indicators and read receipts shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SenderAction {
    MarkSeen,
    TypingOn,
    TypingOff,
}

impl SenderAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MarkSeen => "mark_seen",
            Self::TypingOn => "typing_on",
            Self::TypingOff => "typing_off",
        }
    }
}

/// Acknowledgment returned by the provider for a sent message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    pub recipient_id: String,
    pub message_id: Option<String>,
}

/// Outbound transport for replies.
#[async_trait]
pub trait ReplySender: Send + Sync {
    /// Send a message payload (`{"text": ...}`, `{"attachment": ...}`, ...).
    async fn send_reply(
        &self,
        recipient_id: &str,
        message: &serde_json::Value,
    ) -> Result<SendReceipt>;

    async fn send_sender_action(&self, recipient_id: &str, action: SenderAction) -> Result<()>;
}

/// Sender used when no page access token is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSender;

#[async_trait]
impl ReplySender for DisabledSender {
    async fn send_reply(
        &self,
        recipient_id: &str,
        _message: &serde_json::Value,
    ) -> Result<SendReceipt> {
        debug!(recipient_id, "reply dropped, send API not configured");
        Err(SendError::unavailable("no page access token configured"))
    }

    async fn send_sender_action(&self, recipient_id: &str, action: SenderAction) -> Result<()> {
        debug!(
            recipient_id,
            action = action.as_str(),
            "sender action dropped, send API not configured"
        );
        Err(SendError::unavailable("no page access token configured"))
    }
}

/// Reply capability bound to one recipient.
#[derive(Clone)]
pub struct ReplyChannel {
    recipient_id: String,
    sender: Arc<dyn ReplySender>,
}

impl std::fmt::Debug for ReplyChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyChannel")
            .field("recipient_id", &self.recipient_id)
            .finish_non_exhaustive()
    }
}

impl ReplyChannel {
    pub fn new(recipient_id: impl Into<String>, sender: Arc<dyn ReplySender>) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            sender,
        }
    }

    pub fn recipient_id(&self) -> &str {
        &self.recipient_id
    }

    pub async fn send_reply(&self, message: &serde_json::Value) -> Result<SendReceipt> {
        self.sender.send_reply(&self.recipient_id, message).await
    }

    /// Shorthand for a plain text reply.
    pub async fn send_text(&self, text: &str) -> Result<SendReceipt> {
        self.send_reply(&serde_json::json!({ "text": text })).await
    }

    pub async fn send_sender_action(&self, action: SenderAction) -> Result<()> {
        self.sender
            .send_sender_action(&self.recipient_id, action)
            .await
    }

    pub async fn mark_seen(&self) -> Result<()> {
        self.send_sender_action(SenderAction::MarkSeen).await
    }

    /// Show the typing indicator for `duration`, then hide it.
    pub async fn typing_for(&self, duration: Duration) -> Result<()> {
        self.send_sender_action(SenderAction::TypingOn).await?;
        tokio::time::sleep(duration).await;
        self.send_sender_action(SenderAction::TypingOff).await
    }
}

/// Produces the reply channel for an event's sender.
pub trait ReplyBinder: Send + Sync {
    fn bind(&self, sender_id: &str) -> ReplyChannel;
}

/// Binds every sender to the same outbound transport.
#[derive(Clone)]
pub struct SenderBinder {
    sender: Arc<dyn ReplySender>,
}

impl SenderBinder {
    pub fn new(sender: Arc<dyn ReplySender>) -> Self {
        Self { sender }
    }

    /// Binder whose channels always fail with [`SendError::Unavailable`].
    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledSender))
    }
}

impl ReplyBinder for SenderBinder {
    fn bind(&self, sender_id: &str) -> ReplyChannel {
        ReplyChannel::new(sender_id, Arc::clone(&self.sender))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod tests {
    use {super::*, std::sync::Mutex};

    /// Records every outbound call.
    #[derive(Default)]
    pub(crate) struct RecordingSender {
        pub(crate) calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ReplySender for RecordingSender {
        async fn send_reply(
            &self,
            recipient_id: &str,
            message: &serde_json::Value,
        ) -> Result<SendReceipt> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("reply:{recipient_id}:{message}"));
            Ok(SendReceipt {
                recipient_id: recipient_id.into(),
                message_id: Some("mid.out".into()),
            })
        }

        async fn send_sender_action(&self, recipient_id: &str, action: SenderAction) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("action:{recipient_id}:{}", action.as_str()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn binder_routes_to_sender() {
        let sender = Arc::new(RecordingSender::default());
        let binder = SenderBinder::new(sender.clone());
        let channel = binder.bind("user-1");
        assert_eq!(channel.recipient_id(), "user-1");

        let receipt = channel.send_text("hi").await.unwrap();
        assert_eq!(receipt.message_id.as_deref(), Some("mid.out"));
        channel.mark_seen().await.unwrap();

        assert_eq!(*sender.calls.lock().unwrap(), vec![
            r#"reply:user-1:{"text":"hi"}"#.to_string(),
            "action:user-1:mark_seen".to_string(),
        ]);
    }

    #[tokio::test(start_paused = true)]
    async fn typing_for_brackets_the_wait() {
        let sender = Arc::new(RecordingSender::default());
        let channel = ReplyChannel::new("u", sender.clone());

        let started = tokio::time::Instant::now();
        channel.typing_for(Duration::from_secs(3)).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(3));

        assert_eq!(*sender.calls.lock().unwrap(), vec![
            "action:u:typing_on".to_string(),
            "action:u:typing_off".to_string(),
        ]);
    }

    #[tokio::test]
    async fn disabled_sender_reports_unavailable() {
        let channel = SenderBinder::disabled().bind("u");
        assert!(matches!(
            channel.send_text("hi").await,
            Err(SendError::Unavailable { .. })
        ));
        assert!(matches!(
            channel.mark_seen().await,
            Err(SendError::Unavailable { .. })
        ));
    }
}
