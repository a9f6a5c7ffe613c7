//! Event classification.
//!
//! A raw messaging event may populate several payload fields at once. The
//! classifier picks one meaning per event (or one per attachment) with a
//! fixed precedence:
//!
//! 1. echo
//! 2. quick reply
//! 3. text
//! 4. attachments, one classification each, in array order
//! 5. opt-in (authentication)
//! 6. delivery receipt
//! 7. postback
//! 8. read receipt
//! 9. account linking (`linked` / `unlinked`)
//! 10. anything else is [`EventKind::Unknown`]
//!
//! The two message-level overlaps (quick reply vs. text, echo with
//! attachments) are selectable through [`Precedence`].

use std::sync::Arc;

use {
    pagehook_config::PrecedenceConfig,
    pagehook_protocol::{Attachment, MessagingEvent},
};

/// Attachment type carried by an [`EventKind::Attachment`] classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentKind {
    Image,
    Audio,
    Video,
    File,
    Location,
    Fallback,
    Template,
    /// Any type string not listed above.
    Unrecognized,
}

impl AttachmentKind {
    pub fn from_type(kind: &str) -> Self {
        match kind {
            "image" => Self::Image,
            "audio" => Self::Audio,
            "video" => Self::Video,
            "file" => Self::File,
            "location" => Self::Location,
            "fallback" => Self::Fallback,
            "template" => Self::Template,
            _ => Self::Unrecognized,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::File => "file",
            Self::Location => "location",
            Self::Fallback => "fallback",
            Self::Template => "template",
            Self::Unrecognized => "unrecognized",
        }
    }
}

/// Classification tag. Handlers subscribe by tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    EchoMessage,
    QuickReply,
    TextMessage,
    Attachment(AttachmentKind),
    /// Opt-in through the "Send to Messenger" plugin.
    Authentication,
    Delivery,
    Postback,
    Read,
    AccountLinked,
    AccountUnlinked,
    Unknown,
}

impl EventKind {
    /// Every tag, attachments included. Useful for catch-all subscriptions.
    pub const ALL: [Self; 18] = [
        Self::EchoMessage,
        Self::QuickReply,
        Self::TextMessage,
        Self::Attachment(AttachmentKind::Image),
        Self::Attachment(AttachmentKind::Audio),
        Self::Attachment(AttachmentKind::Video),
        Self::Attachment(AttachmentKind::File),
        Self::Attachment(AttachmentKind::Location),
        Self::Attachment(AttachmentKind::Fallback),
        Self::Attachment(AttachmentKind::Template),
        Self::Attachment(AttachmentKind::Unrecognized),
        Self::Authentication,
        Self::Delivery,
        Self::Postback,
        Self::Read,
        Self::AccountLinked,
        Self::AccountUnlinked,
        Self::Unknown,
    ];

    /// Stable label for logs and metrics.
    pub fn label(self) -> &'static str {
        match self {
            Self::EchoMessage => "echo_message",
            Self::QuickReply => "quick_reply",
            Self::TextMessage => "text_message",
            Self::Attachment(_) => "attachment",
            Self::Authentication => "authentication",
            Self::Delivery => "delivery",
            Self::Postback => "postback",
            Self::Read => "read",
            Self::AccountLinked => "account_linked",
            Self::AccountUnlinked => "account_unlinked",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Attachment(kind) => write!(f, "attachment({})", kind.as_str()),
            other => f.write_str(other.label()),
        }
    }
}

/// One meaning of one messaging event.
#[derive(Debug, Clone)]
pub struct ClassifiedEvent {
    pub kind: EventKind,
    pub event: Arc<MessagingEvent>,
    /// The attachment that produced an `Attachment` classification.
    pub attachment: Option<Attachment>,
}

impl ClassifiedEvent {
    fn new(kind: EventKind, event: &Arc<MessagingEvent>) -> Self {
        Self {
            kind,
            event: Arc::clone(event),
            attachment: None,
        }
    }

    pub fn sender_id(&self) -> &str {
        self.event.sender_id()
    }

    pub fn text(&self) -> Option<&str> {
        self.event.message.as_ref()?.text.as_deref()
    }

    pub fn quick_reply_payload(&self) -> Option<&str> {
        self.event
            .message
            .as_ref()?
            .quick_reply
            .as_ref()
            .map(|q| q.payload.as_str())
    }

    pub fn postback_payload(&self) -> Option<&str> {
        self.event.postback.as_ref().map(|p| p.payload.as_str())
    }
}

/// Tie-breaks for message-level overlaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precedence {
    /// Quick reply wins over text when both are present.
    pub quick_reply_over_text: bool,
    /// An echo with attachments is a single `EchoMessage`.
    pub echo_absorbs_attachments: bool,
}

impl Default for Precedence {
    fn default() -> Self {
        Self {
            quick_reply_over_text: true,
            echo_absorbs_attachments: true,
        }
    }
}

impl From<PrecedenceConfig> for Precedence {
    fn from(config: PrecedenceConfig) -> Self {
        Self {
            quick_reply_over_text: config.quick_reply_over_text,
            echo_absorbs_attachments: config.echo_absorbs_attachments,
        }
    }
}

/// Classify with the default precedence.
pub fn classify(event: &Arc<MessagingEvent>) -> Vec<ClassifiedEvent> {
    classify_with(event, &Precedence::default())
}

/// Classify with an explicit precedence. Never empty.
pub fn classify_with(event: &Arc<MessagingEvent>, precedence: &Precedence) -> Vec<ClassifiedEvent> {
    let one = |kind| vec![ClassifiedEvent::new(kind, event)];

    if let Some(message) = &event.message {
        let fan_out = || {
            message
                .attachments
                .iter()
                .map(|attachment| ClassifiedEvent {
                    kind: EventKind::Attachment(AttachmentKind::from_type(&attachment.kind)),
                    event: Arc::clone(event),
                    attachment: Some(attachment.clone()),
                })
                .collect::<Vec<_>>()
        };

        if message.is_echo {
            if precedence.echo_absorbs_attachments || message.attachments.is_empty() {
                return one(EventKind::EchoMessage);
            }
            return fan_out();
        }

        let quick_reply = message.quick_reply.is_some();
        let text = message.text.is_some();
        match (quick_reply, text, precedence.quick_reply_over_text) {
            (true, false, _) | (true, true, true) => return one(EventKind::QuickReply),
            (_, true, _) => return one(EventKind::TextMessage),
            _ => {},
        }

        if !message.attachments.is_empty() {
            return fan_out();
        }
    }

    let kind = if event.optin.is_some() {
        EventKind::Authentication
    } else if event.delivery.is_some() {
        EventKind::Delivery
    } else if event.postback.is_some() {
        EventKind::Postback
    } else if event.read.is_some() {
        EventKind::Read
    } else {
        match event.account_linking.as_ref().map(|l| l.status.as_str()) {
            Some("linked") => EventKind::AccountLinked,
            Some("unlinked") => EventKind::AccountUnlinked,
            _ => EventKind::Unknown,
        }
    };
    one(kind)
}
