//! Signature and subscription-handshake verification.
//!
//! Notifications carry `X-Hub-Signature: sha1=<hex>` (or
//! `X-Hub-Signature-256: sha256=<hex>`), an HMAC of the raw body keyed by
//! the app secret. Verification runs on the bytes as received, before any
//! JSON parsing.

use {
    hmac::{Hmac, Mac},
    secrecy::{ExposeSecret, Secret},
    sha1::Sha1,
    sha2::Sha256,
    tracing::debug,
};

use {
    pagehook_config::SignatureAlgorithm,
    pagehook_protocol::{SIGNATURE_256_HEADER, SIGNATURE_HEADER, hub},
};

use crate::error::{HandshakeError, SignatureError};

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

// ── Signature ────────────────────────────────────────────────────────────────

/// Checks notification bodies against the shared app secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    algorithm: SignatureAlgorithm,
    secret: Secret<String>,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("algorithm", &self.algorithm)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl SignatureVerifier {
    pub fn new(algorithm: SignatureAlgorithm, secret: Secret<String>) -> Self {
        Self { algorithm, secret }
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Header carrying the signature for the configured algorithm.
    pub fn header_name(&self) -> &'static str {
        header_name(self.algorithm)
    }

    /// Verify `header` (the raw header value, if any) against `body`.
    pub fn verify(&self, body: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
        let (label, supplied_hex) = header
            .and_then(|value| value.trim().split_once('='))
            .filter(|(label, hex)| !label.is_empty() && !hex.is_empty())
            .ok_or(SignatureError::MissingSignature)?;

        if !label.eq_ignore_ascii_case(self.algorithm.label()) {
            debug!(label, expected = %self.algorithm, "signature algorithm not accepted");
            return Err(SignatureError::UnsupportedAlgorithm {
                label: label.to_string(),
            });
        }

        let supplied = hex::decode(supplied_hex).map_err(|_| SignatureError::SignatureMismatch)?;
        let computed = self.mac(body).ok_or(SignatureError::SignatureMismatch)?;

        if constant_time_eq(&computed, &supplied) {
            Ok(())
        } else {
            Err(SignatureError::SignatureMismatch)
        }
    }

    /// Header value (`<algo>=<hex>`) for `body`.
    ///
    /// Returns `None` only if the HMAC cannot be keyed, which does not happen
    /// for the supported digests.
    pub fn sign(&self, body: &[u8]) -> Option<String> {
        let digest = self.mac(body)?;
        Some(format!("{}={}", self.algorithm.label(), hex::encode(digest)))
    }

    fn mac(&self, body: &[u8]) -> Option<Vec<u8>> {
        let key = self.secret.expose_secret().as_bytes();
        match self.algorithm {
            SignatureAlgorithm::Sha1 => {
                let mut mac = HmacSha1::new_from_slice(key).ok()?;
                mac.update(body);
                Some(mac.finalize().into_bytes().to_vec())
            },
            SignatureAlgorithm::Sha256 => {
                let mut mac = HmacSha256::new_from_slice(key).ok()?;
                mac.update(body);
                Some(mac.finalize().into_bytes().to_vec())
            },
        }
    }
}

/// Header name used by the provider for `algorithm`.
pub fn header_name(algorithm: SignatureAlgorithm) -> &'static str {
    match algorithm {
        SignatureAlgorithm::Sha1 => SIGNATURE_HEADER,
        SignatureAlgorithm::Sha256 => SIGNATURE_256_HEADER,
    }
}

/// Byte comparison that does not stop at the first difference.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ── Handshake ────────────────────────────────────────────────────────────────

/// Echo `challenge` when `supplied` matches `expected` exactly.
pub fn verify_challenge(
    expected: &str,
    supplied: &str,
    challenge: &str,
) -> Result<String, HandshakeError> {
    if constant_time_eq(expected.as_bytes(), supplied.as_bytes()) {
        Ok(challenge.to_string())
    } else {
        Err(HandshakeError::InvalidVerifyToken)
    }
}

/// Handshake check over the raw `hub.*` query parameters.
///
/// `hub.mode` may be absent; when present it must be `subscribe`.
pub fn verify_subscription(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    expected: &str,
) -> Result<String, HandshakeError> {
    let token = token.ok_or(HandshakeError::InvalidVerifyToken)?;
    if let Some(mode) = mode
        && mode != hub::SUBSCRIBE
    {
        return Err(HandshakeError::UnsupportedMode {
            mode: mode.to_string(),
        });
    }
    let challenge = challenge.ok_or(HandshakeError::MissingChallenge)?;
    verify_challenge(expected, token, challenge)
}
