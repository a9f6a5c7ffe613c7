use std::error::Error as StdError;

/// Rejection of an inbound notification body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("missing or malformed signature header")]
    MissingSignature,

    #[error("unsupported signature algorithm: {label}")]
    UnsupportedAlgorithm { label: String },

    #[error("signature does not match body")]
    SignatureMismatch,
}

impl SignatureError {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingSignature => "missing",
            Self::UnsupportedAlgorithm { .. } => "unsupported_algorithm",
            Self::SignatureMismatch => "mismatch",
        }
    }
}

/// Rejection of a subscription handshake.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("verify token does not match")]
    InvalidVerifyToken,

    #[error("handshake is missing hub.challenge")]
    MissingChallenge,

    #[error("unsupported hub.mode: {mode}")]
    UnsupportedMode { mode: String },
}

/// Failure to deliver an outbound reply or sender action.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("reply channel unavailable: {message}")]
    Unavailable { message: String },

    #[error("send API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl SendError {
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn external<E>(context: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

pub type Result<T, E = SendError> = std::result::Result<T, E>;
