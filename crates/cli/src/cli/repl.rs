//! `kgq repl`: interactive session.
//!
//! Opens a readline loop that runs each line as a program against one
//! persistent connection.  Notifications and connection state changes are
//! printed to stderr as they arrive, so stdout only carries results.

use anyhow::Context;
use kg_client::{Client, ConnectionState};
use rustyline::error::ReadlineError;

use super::config::KgqConfig;
use super::render;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn run(config: &KgqConfig, mut json: bool) -> anyhow::Result<()> {
    // 1. Connect, with handlers in place before the first transition.
    let client = Client::from_config(config.client.clone())?;
    let notifications = client.on_notification(|payload| {
        let text = serde_json::to_string(payload).unwrap_or_default();
        eprintln!("\x1B[36mnotification: {text}\x1B[0m");
    });
    let state_changes = client.on_state_change(|state| {
        if *state != ConnectionState::Connected {
            eprintln!("\x1B[33m[{state}]\x1B[0m");
        }
    });

    let session = client
        .connect(config.auth.credentials())
        .await
        .with_context(|| format!("connecting to {}", config.client.url))?;

    // 2. Readline editor with persistent history.
    let history_path = dirs::home_dir().unwrap_or_default().join(".kgq_history");
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    eprintln!(
        "Connected to {} as {}  |  Type /help for commands, Ctrl+D to exit",
        session.bound_namespace,
        if session.role.is_empty() { "-" } else { session.role.as_str() }
    );

    // 3. REPL loop.
    loop {
        let prompt = format!(
            "{}> ",
            client.bound_namespace().unwrap_or_else(|| "-".into())
        );
        match rl.readline(&prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(&line).ok();

                if trimmed.starts_with('/') {
                    if handle_slash_command(trimmed, &client, &mut json) {
                        break;
                    }
                    continue;
                }

                match client.execute(trimmed).await {
                    Ok(result) => render::print_result(&result, json)?,
                    Err(e) => eprintln!("\x1B[31merror: {}\x1B[0m", render::describe_error(&e)),
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or /exit to quit)");
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    // 4. Save history and close.
    rl.save_history(&history_path).ok();
    notifications.unsubscribe();
    state_changes.unsubscribe();
    client.disconnect().await;

    eprintln!("Goodbye!");
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Slash command handling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process a slash command.  Returns `true` if the REPL should exit.
fn handle_slash_command(input: &str, client: &Client, json: &mut bool) -> bool {
    let cmd = input.split_whitespace().next().unwrap_or(input);

    match cmd {
        "/exit" | "/quit" => return true,

        "/state" => eprintln!("{}", client.state()),

        "/session" => match client.session() {
            Some(s) => {
                let id = s.session_id.map(|id| id.to_string());
                eprintln!("session:   {}", id.as_deref().unwrap_or("-"));
                eprintln!("namespace: {}", s.bound_namespace);
                eprintln!("role:      {}", if s.role.is_empty() { "-" } else { s.role.as_str() });
            }
            None => eprintln!("no session ({})", client.state()),
        },

        "/json" => {
            *json = !*json;
            eprintln!("JSON output {}", if *json { "on" } else { "off" });
        }

        "/help" => {
            eprintln!("Commands:");
            eprintln!("  /state        Show the connection state");
            eprintln!("  /session      Show session id, namespace and role");
            eprintln!("  /json         Toggle JSON output");
            eprintln!("  /exit, /quit  Exit");
            eprintln!("  /help         Show this help");
            eprintln!("Anything else is sent to the engine as a program.");
        }

        other => {
            eprintln!("Unknown command: {other}  (type /help for a list)");
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slash_commands() {
        let client = Client::builder().build().unwrap();
        let mut json = false;

        assert!(!handle_slash_command("/json", &client, &mut json));
        assert!(json);
        assert!(!handle_slash_command("/state", &client, &mut json));
        assert!(!handle_slash_command("/session", &client, &mut json));
        assert!(!handle_slash_command("/nope", &client, &mut json));
        assert!(handle_slash_command("/exit", &client, &mut json));
        assert!(handle_slash_command("/quit now", &client, &mut json));
    }
}
