use std::{
    io::Read,
    path::Path,
};

use anyhow::{Context, Result, bail};

use {
    pagehook_config::{WebhookConfig, discover_and_load},
    pagehook_webhook::SignatureVerifier,
};

/// Print `<header>: <algorithm>=<hex>` for a body from `file` or stdin.
pub fn sign(config_path: Option<&Path>, file: Option<&Path>) -> Result<()> {
    let (config, _) = discover_and_load(config_path).context("failed to load config")?;

    let body = match file {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?
        },
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("failed to read stdin")?;
            buf
        },
    };

    let (header, value) = signature_header(&config.webhook, &body)?;
    println!("{header}: {value}");
    Ok(())
}

fn signature_header(webhook: &WebhookConfig, body: &[u8]) -> Result<(&'static str, String)> {
    if !webhook.has_app_secret() {
        bail!("webhook.app_secret is not set (or set PAGEHOOK_APP_SECRET)");
    }
    let verifier = SignatureVerifier::new(webhook.signature_algorithm, webhook.app_secret.clone());
    let value = verifier
        .sign(body)
        .context("failed to compute body signature")?;
    Ok((verifier.header_name(), value))
}
