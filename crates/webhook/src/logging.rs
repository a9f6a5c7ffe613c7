//! Built-in handler that logs every classified event.

use std::sync::Arc;

use {async_trait::async_trait, tracing::info};

use crate::{
    classify::{ClassifiedEvent, EventKind},
    registry::{EventHandler, SubscriptionRegistry},
    reply::ReplyChannel,
};

/// Logs the interesting fields of each event kind at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

impl LoggingHandler {
    pub const NAME: &'static str = "log";

    /// Subscribe a logging handler to every classification.
    pub fn register(registry: &mut SubscriptionRegistry) {
        registry.on_all(EventKind::ALL, Arc::new(Self));
    }
}

#[async_trait]
impl EventHandler for LoggingHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn handle(&self, event: ClassifiedEvent, _reply: ReplyChannel) -> anyhow::Result<()> {
        let raw = &event.event;
        let sender_id = raw.sender_id();
        let recipient_id = raw.recipient_id();
        let timestamp = raw.timestamp;
        let message = raw.message.as_ref();

        match event.kind {
            EventKind::EchoMessage => {
                info!(
                    sender_id,
                    recipient_id,
                    mid = raw.mid(),
                    app_id = message.and_then(|m| m.app_id.as_deref()),
                    metadata = message.and_then(|m| m.metadata.as_deref()),
                    "received echo message"
                );
            },
            EventKind::QuickReply => {
                info!(
                    sender_id,
                    recipient_id,
                    mid = raw.mid(),
                    payload = event.quick_reply_payload(),
                    "received quick reply"
                );
            },
            EventKind::TextMessage => {
                info!(
                    sender_id,
                    recipient_id,
                    timestamp,
                    mid = raw.mid(),
                    seq = message.and_then(|m| m.seq),
                    text = event.text(),
                    "received message"
                );
            },
            EventKind::Attachment(kind) => {
                let attachment = event.attachment.as_ref();
                info!(
                    sender_id,
                    recipient_id,
                    mid = raw.mid(),
                    kind = kind.as_str(),
                    url = attachment.and_then(|a| a.url()),
                    title = attachment.and_then(|a| a.title.as_deref()),
                    "received attachment"
                );
                if let Some(coordinates) = attachment.and_then(|a| a.coordinates()) {
                    info!(
                        sender_id,
                        lat = coordinates.lat,
                        long = coordinates.long,
                        "attachment location"
                    );
                }
            },
            EventKind::Authentication => {
                let pass_through = raw.optin.as_ref().and_then(|o| o.reference.as_deref());
                info!(
                    sender_id,
                    recipient_id,
                    timestamp,
                    pass_through,
                    "received authentication"
                );
            },
            EventKind::Delivery => {
                if let Some(delivery) = &raw.delivery {
                    for mid in &delivery.mids {
                        info!(sender_id, mid, "received delivery confirmation");
                    }
                    info!(
                        sender_id,
                        watermark = delivery.watermark,
                        seq = delivery.seq,
                        "all messages before watermark were delivered"
                    );
                }
            },
            EventKind::Postback => {
                info!(
                    sender_id,
                    recipient_id,
                    timestamp,
                    payload = event.postback_payload(),
                    title = raw.postback.as_ref().and_then(|p| p.title.as_deref()),
                    "received postback"
                );
            },
            EventKind::Read => {
                if let Some(read) = &raw.read {
                    info!(
                        sender_id,
                        watermark = read.watermark,
                        seq = read.seq,
                        "received message read event"
                    );
                }
            },
            EventKind::AccountLinked | EventKind::AccountUnlinked => {
                let linking = raw.account_linking.as_ref();
                info!(
                    sender_id,
                    status = linking.map(|l| l.status.as_str()),
                    authorization_code = linking.and_then(|l| l.authorization_code.as_deref()),
                    "received account link event"
                );
            },
            EventKind::Unknown => {
                info!(sender_id, recipient_id, timestamp, "received unknown event");
            },
        }
        Ok(())
    }
}
