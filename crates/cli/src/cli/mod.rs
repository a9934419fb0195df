pub mod config;
pub mod exec;
pub mod render;
pub mod repl;

use clap::{Parser, Subcommand};

use self::config::KgqConfig;

/// kgq: run programs against a knowledge-graph query engine.
#[derive(Debug, Parser)]
#[command(name = "kgq", version, about)]
pub struct Cli {
    /// Path to the config file.
    #[arg(long, global = true, default_value = "kgq.toml")]
    pub config: String,

    /// Override the engine URL from the config file.
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Override the knowledge graph to bind.
    #[arg(long, short = 'n', global = true)]
    pub namespace: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one program and print its result.
    Exec {
        /// Program text, e.g. '?edge(X,Y)'.
        program: String,
        /// Print the result as JSON instead of a table.
        #[arg(long)]
        json: bool,
        /// Per-request timeout in milliseconds (0 waits indefinitely).
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Interactive session with history and slash-commands.
    Repl {
        /// Start with JSON output (toggle with /json).
        #[arg(long)]
        json: bool,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the config file named by `--config` (defaults when it does not
/// exist) and apply command-line overrides.  Returns the config and the
/// path that was used.
pub fn load_config(cli: &Cli) -> anyhow::Result<(KgqConfig, String)> {
    let path = cli.config.clone();
    let mut config = KgqConfig::load_or_default(&path)?;
    if let Some(url) = &cli.url {
        config.client.url = url.clone();
    }
    if let Some(namespace) = &cli.namespace {
        config.client.namespace = namespace.clone();
    }
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exec_with_flags() {
        let cli = Cli::parse_from([
            "kgq",
            "--namespace",
            "movies",
            "exec",
            "?edge(X,Y)",
            "--json",
            "--timeout-ms",
            "250",
        ]);
        assert_eq!(cli.config, "kgq.toml");
        assert_eq!(cli.namespace.as_deref(), Some("movies"));
        match cli.command {
            Command::Exec {
                program,
                json,
                timeout_ms,
            } => {
                assert_eq!(program, "?edge(X,Y)");
                assert!(json);
                assert_eq!(timeout_ms, Some(250));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn overrides_apply_over_missing_file() {
        let cli = Cli::parse_from([
            "kgq",
            "--config",
            "/nonexistent/kgq.toml",
            "--url",
            "ws://engine:9000/ws",
            "repl",
        ]);
        let (config, path) = load_config(&cli).unwrap();
        assert_eq!(path, "/nonexistent/kgq.toml");
        assert_eq!(config.client.url, "ws://engine:9000/ws");
        assert_eq!(config.client.namespace, "default");
    }
}
