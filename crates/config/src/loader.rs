use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, info},
};

use crate::{
    error::{Error, Result},
    schema::PagehookConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "pagehook.toml",
    "pagehook.yaml",
    "pagehook.yml",
    "pagehook.json",
];

pub const ENV_APP_SECRET: &str = "PAGEHOOK_APP_SECRET";
pub const ENV_VERIFY_TOKEN: &str = "PAGEHOOK_VERIFY_TOKEN";
pub const ENV_PAGE_ACCESS_TOKEN: &str = "PAGEHOOK_PAGE_ACCESS_TOKEN";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<PagehookConfig> {
    let raw = read_substituted(path)?;
    match extension(path) {
        "toml" => Ok(toml::from_str(&raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(&raw)?),
        "json" => Ok(serde_json::from_str(&raw)?),
        other => Err(Error::UnsupportedFormat {
            extension: other.to_string(),
        }),
    }
}

/// Load the config file as an untyped JSON tree, for validation.
pub fn load_config_value(path: &Path) -> Result<serde_json::Value> {
    let raw = read_substituted(path)?;
    match extension(path) {
        "toml" => {
            let v: toml::Value = toml::from_str(&raw)?;
            Ok(serde_json::to_value(v)?)
        },
        "yaml" | "yml" => {
            let v: serde_yaml::Value = serde_yaml::from_str(&raw)?;
            Ok(serde_json::to_value(v)?)
        },
        "json" => Ok(serde_json::from_str(&raw)?),
        other => Err(Error::UnsupportedFormat {
            extension: other.to_string(),
        }),
    }
}

/// Load the explicit config file, or the first one found in the standard
/// locations, then apply environment overrides.
///
/// Without an explicit path and without a discovered file the defaults are
/// used, so secrets can come from the environment alone.
pub fn discover_and_load(explicit: Option<&Path>) -> Result<(PagehookConfig, Option<PathBuf>)> {
    let path = explicit.map(Path::to_path_buf).or_else(find_config_file);
    let mut config = match &path {
        Some(p) => {
            info!(path = %p.display(), "loading config");
            load_config(p)?
        },
        None => {
            debug!("no config file found, using defaults");
            PagehookConfig::default()
        },
    };
    apply_env_overrides(&mut config);
    Ok((config, path))
}

/// Find the first config file in standard locations.
///
/// Search order:
/// 1. `./pagehook.{toml,yaml,yml,json}`
/// 2. `~/.config/pagehook/pagehook.{toml,yaml,yml,json}`
pub fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES.iter().map(PathBuf::from);
    let global = config_dir()
        .into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)));
    local.chain(global).find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/pagehook/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "pagehook").map(|d| d.config_dir().to_path_buf())
}

/// Apply `PAGEHOOK_*` environment variables on top of the file config.
pub fn apply_env_overrides(config: &mut PagehookConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(config: &mut PagehookConfig, lookup: impl Fn(&str) -> Option<String>) {
    let lookup = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(secret) = lookup(ENV_APP_SECRET) {
        debug!(var = ENV_APP_SECRET, "app secret overridden from environment");
        config.webhook.app_secret = Secret::new(secret);
    }
    if let Some(token) = lookup(ENV_VERIFY_TOKEN) {
        debug!(var = ENV_VERIFY_TOKEN, "verify token overridden from environment");
        config.webhook.verify_token = Secret::new(token);
    }
    if let Some(token) = lookup(ENV_PAGE_ACCESS_TOKEN) {
        debug!(
            var = ENV_PAGE_ACCESS_TOKEN,
            "page access token overridden from environment"
        );
        config.send_api.page_access_token = Some(Secret::new(token));
    }
}

fn read_substituted(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::read(path, e))?;
    Ok(substitute_env(&raw))
}

fn extension(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("toml")
}

/// Replace `${ENV_VAR}` placeholders. Unresolvable variables are left as-is.
pub fn substitute_env(input: &str) -> String {
    substitute_env_with(input, |name| std::env::var(name).ok())
}

fn substitute_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(&rest[start..start + end + 3]),
                }
                rest = &after[end + 1..];
            },
            _ => {
                out.push_str("${");
                rest = after;
            },
        }
    }

    out.push_str(rest);
    out
}
