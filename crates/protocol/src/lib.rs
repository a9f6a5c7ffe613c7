//! Messenger webhook wire types.
//!
//! A notification body is an [`Envelope`] holding one [`Entry`] per page,
//! each carrying an ordered list of [`MessagingEvent`]s. Every payload
//! field is optional on the wire; picking the one that applies is the
//! classifier's job, not the decoder's.

use serde::{Deserialize, Deserializer, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

/// The only `object` value the webhook processes.
pub const PAGE_OBJECT: &str = "page";

/// Header carrying the `sha1=<hex>` body signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature";

/// Header carrying the `sha256=<hex>` body signature.
pub const SIGNATURE_256_HEADER: &str = "x-hub-signature-256";

pub mod hub {
    pub const MODE: &str = "hub.mode";
    pub const VERIFY_TOKEN: &str = "hub.verify_token";
    pub const CHALLENGE: &str = "hub.challenge";
    pub const SUBSCRIBE: &str = "subscribe";
}

// ── Envelope ─────────────────────────────────────────────────────────────────

/// Top-level notification payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

impl Envelope {
    pub fn is_page(&self) -> bool {
        self.object == PAGE_OBJECT
    }

    /// Total number of messaging events across all entries.
    pub fn event_count(&self) -> usize {
        self.entry.iter().map(|e| e.messaging.len()).sum()
    }
}

/// One batch of events for one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    /// Milliseconds since the epoch.
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub messaging: Vec<MessagingEvent>,
}

// ── Messaging events ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
}

/// One sender/recipient interaction record.
///
/// Fields the decoder does not know about are kept in `extra` so an event
/// that classifies as unknown can still be logged in full.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagingEvent {
    #[serde(default)]
    pub sender: Participant,
    #[serde(default)]
    pub recipient: Participant,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optin: Option<OptIn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<Delivery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postback: Option<Postback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<Read>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_linking: Option<AccountLinking>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MessagingEvent {
    pub fn sender_id(&self) -> &str {
        &self.sender.id
    }

    pub fn recipient_id(&self) -> &str {
        &self.recipient.id
    }

    /// Message ID, when the event carries a message.
    pub fn mid(&self) -> Option<&str> {
        self.message.as_ref()?.mid.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<i64>,
    /// Set when the page itself sent the message.
    #[serde(
        default,
        deserialize_with = "lenient_bool",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub is_echo: bool,
    #[serde(
        default,
        deserialize_with = "opt_string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_reply: Option<QuickReply>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickReply {
    #[serde(default)]
    pub payload: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// Raw attachment type: `image`, `audio`, `video`, `file`, `location`,
    /// `fallback`, `template`, ...
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<AttachmentPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Fallback attachments carry their URL at the top level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Attachment {
    pub fn url(&self) -> Option<&str> {
        self.payload
            .as_ref()
            .and_then(|p| p.url.as_deref())
            .or(self.url.as_deref())
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        self.payload.as_ref()?.coordinates
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachmentPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    /// Template payloads (`template_type`, `elements`, ...) pass through here.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub long: f64,
}

/// Authentication (plugin opt-in) payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptIn {
    /// Pass-through parameter set on the plugin.
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    #[serde(default)]
    pub mids: Vec<String>,
    /// Every message sent before this timestamp was delivered.
    #[serde(default)]
    pub watermark: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Postback {
    #[serde(default)]
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Read {
    /// Every message sent before this timestamp was read.
    #[serde(default)]
    pub watermark: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLinking {
    /// `linked` or `unlinked`.
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<String>,
}

// ── Helpers ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Signed(i64),
    Unsigned(u64),
}

impl From<StringOrNumber> for String {
    fn from(value: StringOrNumber) -> Self {
        match value {
            StringOrNumber::String(s) => s,
            StringOrNumber::Signed(n) => n.to_string(),
            StringOrNumber::Unsigned(n) => n.to_string(),
        }
    }
}

/// Page and user IDs show up both quoted and unquoted.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(StringOrNumber::deserialize(deserializer)?.into())
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<StringOrNumber>::deserialize(deserializer)?.map(Into::into))
}

/// `true`, `"true"` and `1` are set; anything else, `null` included, is unset.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::String(s) => s.eq_ignore_ascii_case("true"),
        serde_json::Value::Number(n) => n.as_u64() == Some(1),
        _ => false,
    })
}
