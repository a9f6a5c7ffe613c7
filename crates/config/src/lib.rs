//! Configuration loading and validation.
//!
//! Config files: `pagehook.toml`, `pagehook.yaml`, or `pagehook.json`
//! Searched in `./` then `~/.config/pagehook/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values, and
//! `PAGEHOOK_*` environment overrides for the secrets.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, config_dir, discover_and_load, find_config_file, load_config},
    schema::{
        MetricsConfig, NotificationType, PagehookConfig, PrecedenceConfig, SendApiConfig,
        ServerConfig, SignatureAlgorithm, WebhookConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate, validate_config},
};
