//! `kgq exec`: run a single program and print the outcome.

use std::time::Duration;

use anyhow::Context;
use kg_client::Client;

use super::config::KgqConfig;
use super::render;

pub async fn run(
    config: &KgqConfig,
    program: &str,
    json: bool,
    timeout_ms: Option<u64>,
) -> anyhow::Result<()> {
    let client = Client::from_config(config.client.clone())?;
    let session = client
        .connect(config.auth.credentials())
        .await
        .with_context(|| format!("connecting to {}", config.client.url))?;
    tracing::debug!(namespace = %session.bound_namespace, role = %session.role, "session ready");

    let timeout = timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.client.request_timeout());
    let outcome = client.execute_with_timeout(program, timeout).await;
    client.disconnect().await;

    match outcome {
        Ok(result) => {
            render::print_result(&result, json)?;
            Ok(())
        }
        Err(e) => anyhow::bail!("{}", render::describe_error(&e)),
    }
}
