use std::path::Path;

use anyhow::Context;
use kg_client::{ClientConfig, Credentials};
use serde::{Deserialize, Serialize};

/// Contents of `kgq.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KgqConfig {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Login identity.  The password is never stored in the file; it is read
/// from the environment variable named by `password_env`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default = "d_password_env")]
    pub password_env: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password_env: d_password_env(),
        }
    }
}

impl AuthConfig {
    pub fn credentials(&self) -> Credentials {
        let password = std::env::var(&self.password_env).unwrap_or_default();
        if password.is_empty() && self.username.is_empty() {
            tracing::debug!("no credentials configured");
        }
        Credentials::new(self.username.clone(), password)
    }
}

fn d_password_env() -> String {
    "KGQ_PASSWORD".into()
}

impl KgqConfig {
    /// Parse `path`, or fall back to defaults when the file does not exist.
    pub fn load_or_default(path: &str) -> anyhow::Result<Self> {
        if !Path::new(path).exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
        toml::from_str(&raw).with_context(|| format!("parsing {path}"))
    }
}

/// Dump the resolved config (with all defaults filled in) as TOML.
pub fn show(config: &KgqConfig) -> anyhow::Result<()> {
    let output = toml::to_string_pretty(config).context("serializing config")?;
    print!("{output}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config: KgqConfig = toml::from_str("").unwrap();
        assert_eq!(config.client.url, "ws://127.0.0.1:8080/ws");
        assert_eq!(config.auth.password_env, "KGQ_PASSWORD");
        assert!(config.auth.username.is_empty());
    }

    #[test]
    fn sections_override_defaults() {
        let config: KgqConfig = toml::from_str(
            r#"
            [client]
            url = "wss://engine.example.com/ws"
            namespace = "movies"

            [client.reconnect]
            max_attempts = 2

            [auth]
            username = "ada"
            password_env = "ENGINE_PASSWORD"
            "#,
        )
        .unwrap();
        assert_eq!(config.client.url, "wss://engine.example.com/ws");
        assert_eq!(config.client.namespace, "movies");
        assert_eq!(config.client.reconnect.max_attempts, 2);
        assert!(config.client.reconnect.enabled);
        assert_eq!(config.auth.username, "ada");
        assert_eq!(config.auth.password_env, "ENGINE_PASSWORD");
    }

    #[test]
    fn password_comes_from_named_env_var() {
        std::env::set_var("KGQ_TEST_PASSWORD_ONLY_HERE", "hunter2");
        let auth = AuthConfig {
            username: "ada".into(),
            password_env: "KGQ_TEST_PASSWORD_ONLY_HERE".into(),
        };
        let creds = auth.credentials();
        assert_eq!(creds.username, "ada");
        assert_eq!(creds.password, "hunter2");
    }

    #[test]
    fn resolved_config_serializes_back() {
        let text = toml::to_string_pretty(&KgqConfig::default()).unwrap();
        let back: KgqConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.client.namespace, "default");
        assert!(text.contains("[client.reconnect]"));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = KgqConfig::load_or_default("/nonexistent/kgq.toml").unwrap();
        assert_eq!(config.client.namespace, "default");
    }
}
