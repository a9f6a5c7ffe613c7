//! Configuration validation.
//!
//! Checks a config file against the known schema, flags unknown or
//! misspelled fields, and reports settings the gateway cannot start with.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use crate::{loader, schema::PagehookConfig};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "missing-secret",
    /// "webhook", "send-api", "security", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "webhook.app_secret"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{} [{}] {}", self.severity, self.category, self.message)
        } else {
            write!(
                f,
                "{} [{}] {}: {}",
                self.severity, self.category, self.path, self.message
            )
        }
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    /// Iterate over error diagnostics only.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    Leaf,
}

fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Struct};

    Struct(HashMap::from([
        ("server", Struct(HashMap::from([("bind", Leaf), ("port", Leaf)]))),
        (
            "webhook",
            Struct(HashMap::from([
                ("path", Leaf),
                ("app_secret", Leaf),
                ("verify_token", Leaf),
                ("signature_algorithm", Leaf),
                ("log_events", Leaf),
                (
                    "precedence",
                    Struct(HashMap::from([
                        ("quick_reply_over_text", Leaf),
                        ("echo_absorbs_attachments", Leaf),
                    ])),
                ),
            ])),
        ),
        (
            "send_api",
            Struct(HashMap::from([
                ("api_url", Leaf),
                ("page_access_token", Leaf),
                ("notification_type", Leaf),
                ("timeout_secs", Leaf),
            ])),
        ),
        ("metrics", Struct(HashMap::from([("enabled", Leaf)]))),
    ]))
}

// ── Levenshtein distance ────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut curr = Vec::with_capacity(prev.len());
        curr.push(i + 1);
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr.push((prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1));
        }
        prev = curr;
    }
    prev[b_chars.len()]
}

/// Closest candidate within `max_distance`, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (*c, levenshtein(needle, c)))
        .filter(|(_, d)| *d > 0 && *d <= max_distance)
        .min_by_key(|(_, d)| *d)
        .map(|(c, _)| c)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or discover the default config
/// file location if `path` is `None`.
///
/// Environment overrides are applied before the semantic checks, so a secret
/// supplied through `PAGEHOOK_APP_SECRET` satisfies the missing-secret check.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = path.map(Path::to_path_buf).or_else(loader::find_config_file);

    let Some(actual_path) = config_path else {
        let mut config = PagehookConfig::default();
        loader::apply_env_overrides(&mut config);
        let mut result = validate_config(&config);
        result.diagnostics.insert(
            0,
            Diagnostic::new(
                Severity::Info,
                "file-ref",
                "",
                "no config file found; using defaults",
            ),
        );
        return result;
    };

    let value = match loader::load_config_value(&actual_path) {
        Ok(v) => v,
        Err(e) => {
            return ValidationResult {
                diagnostics: vec![Diagnostic::new(
                    Severity::Error,
                    "syntax",
                    "",
                    e.to_string(),
                )],
                config_path: Some(actual_path),
            };
        },
    };

    let mut result = validate_value(&value, loader::apply_env_overrides);
    result.config_path = Some(actual_path);
    result
}

/// Validate an already-parsed config tree. `overrides` runs on the typed
/// config before the semantic checks.
pub fn validate_value(
    value: &serde_json::Value,
    overrides: impl FnOnce(&mut PagehookConfig),
) -> ValidationResult {
    let mut diagnostics = Vec::new();

    check_unknown_fields(value, &build_schema_map(), "", &mut diagnostics);

    match serde_json::from_value::<PagehookConfig>(value.clone()) {
        Ok(mut config) => {
            overrides(&mut config);
            check_semantics(&config, &mut diagnostics);
        },
        Err(e) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "type-error",
            "",
            format!("type error: {e}"),
        )),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

/// Semantic checks on a fully resolved config (file plus environment).
#[must_use]
pub fn validate_config(config: &PagehookConfig) -> ValidationResult {
    let mut diagnostics = Vec::new();
    check_semantics(config, &mut diagnostics);
    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_unknown_fields(
    value: &serde_json::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (serde_json::Value::Object(table), KnownKeys::Struct(fields)) = (value, schema) else {
        return;
    };

    let known_keys: Vec<&str> = fields.keys().copied().collect();
    for (key, child_value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match fields.get(key.as_str()) {
            Some(child_schema) => {
                check_unknown_fields(child_value, child_schema, &path, diagnostics);
            },
            None => {
                let message = match suggest(key, &known_keys, 3) {
                    Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
                    None => "unknown field".to_string(),
                };
                diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    "unknown-field",
                    path,
                    message,
                ));
            },
        }
    }
}

fn check_semantics(config: &PagehookConfig, diagnostics: &mut Vec<Diagnostic>) {
    if !config.webhook.has_app_secret() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "missing-secret",
            "webhook.app_secret",
            format!(
                "app secret is required to verify signatures (set it here or via {})",
                loader::ENV_APP_SECRET
            ),
        ));
    }

    if !config.webhook.has_verify_token() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "missing-secret",
            "webhook.verify_token",
            format!(
                "verify token is required for the subscription handshake (set it here or via {})",
                loader::ENV_VERIFY_TOKEN
            ),
        ));
    }

    if !config.webhook.path.starts_with('/') {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "webhook",
            "webhook.path",
            format!("route must start with '/', got \"{}\"", config.webhook.path),
        ));
    }

    if config.send_api.page_access_token.is_none() {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "send-api",
            "send_api.page_access_token",
            format!(
                "no page access token; handlers cannot reply (set it here or via {})",
                loader::ENV_PAGE_ACCESS_TOKEN
            ),
        ));
    }

    let api_url = &config.send_api.api_url;
    if !(api_url.starts_with("https://") || api_url.starts_with("http://")) {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "send-api",
            "send_api.api_url",
            format!("not an http(s) URL: \"{api_url}\""),
        ));
    } else if !api_url.ends_with('/') {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "send-api",
            "send_api.api_url",
            "base URL should end with '/'",
        ));
    }

    if config.send_api.timeout_secs == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "send-api",
            "send_api.timeout_secs",
            "timeout must be greater than zero",
        ));
    }

    let is_localhost = matches!(
        config.server.bind.as_str(),
        "127.0.0.1" | "localhost" | "::1"
    );
    if !is_localhost {
        diagnostics.push(Diagnostic::new(
            Severity::Info,
            "security",
            "server.bind",
            format!(
                "listening on {}; terminate TLS in front of the gateway",
                config.server.bind
            ),
        ));
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::Secret, serde_json::json};

    fn complete() -> serde_json::Value {
        json!({
            "webhook": { "app_secret": "s", "verify_token": "t" },
            "send_api": { "page_access_token": "p" },
        })
    }

    fn no_overrides(_: &mut PagehookConfig) {}

    #[test]
    fn levenshtein_distances() {
        assert_eq!(levenshtein("hello", "hello"), 0);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("port", "prot"), 2);
        assert_eq!(levenshtein("webhok", "webhook"), 1);
    }

    #[test]
    fn complete_config_is_clean() {
        let result = validate_value(&complete(), no_overrides);
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
        assert_eq!(result.count(Severity::Warning), 0);
    }

    #[test]
    fn unknown_field_with_suggestion() {
        let mut value = complete();
        value["webhook"]["app_secert"] = json!("x");
        let result = validate_value(&value, no_overrides);
        let diag = result
            .diagnostics
            .iter()
            .find(|d| d.category == "unknown-field")
            .expect("unknown field reported");
        assert_eq!(diag.path, "webhook.app_secert");
        assert!(diag.message.contains("did you mean \"app_secret\""));
    }

    #[test]
    fn unknown_top_level_section() {
        let mut value = complete();
        value["bogus_section"] = json!({});
        let result = validate_value(&value, no_overrides);
        assert!(
            result
                .errors()
                .any(|d| d.path == "bogus_section" && d.message == "unknown field")
        );
    }

    #[test]
    fn nested_precedence_keys_are_known() {
        let mut value = complete();
        value["webhook"]["precedence"] = json!({ "quick_reply_over_text": false });
        assert!(!validate_value(&value, no_overrides).has_errors());
    }

    #[test]
    fn missing_secrets_are_errors() {
        let result = validate_value(&json!({}), no_overrides);
        let paths: Vec<&str> = result.errors().map(|d| d.path.as_str()).collect();
        assert!(paths.contains(&"webhook.app_secret"));
        assert!(paths.contains(&"webhook.verify_token"));
        assert_eq!(result.count(Severity::Warning), 1, "missing page token");
    }

    #[test]
    fn overrides_satisfy_secret_checks() {
        let result = validate_value(&json!({}), |cfg| {
            cfg.webhook.app_secret = Secret::new("s".into());
            cfg.webhook.verify_token = Secret::new("t".into());
        });
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
    }

    #[test]
    fn type_errors_are_reported() {
        let mut value = complete();
        value["server"] = json!({ "port": "not-a-number" });
        let result = validate_value(&value, no_overrides);
        assert!(result.errors().any(|d| d.category == "type-error"));
    }

    #[test]
    fn bad_route_and_timeout() {
        let mut value = complete();
        value["webhook"]["path"] = json!("webhook");
        value["send_api"]["timeout_secs"] = json!(0);
        let result = validate_value(&value, no_overrides);
        let paths: Vec<&str> = result.errors().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["webhook.path", "send_api.timeout_secs"]);
    }

    #[test]
    fn public_bind_is_informational() {
        let mut value = complete();
        value["server"] = json!({ "bind": "0.0.0.0" });
        let result = validate_value(&value, no_overrides);
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Info), 1);
    }

    #[test]
    fn validate_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pagehook.toml");
        std::fs::write(&path, "[server]\nprot = 1\n").unwrap();
        let result = validate(Some(&path));
        assert_eq!(result.config_path.as_deref(), Some(path.as_path()));
        assert!(
            result
                .errors()
                .any(|d| d.path == "server.prot" && d.message.contains("\"port\""))
        );
    }

    #[test]
    fn validate_reports_syntax_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pagehook.toml");
        std::fs::write(&path, "[server\n").unwrap();
        let result = validate(Some(&path));
        assert!(result.errors().any(|d| d.category == "syntax"));
    }
}
