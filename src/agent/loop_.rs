//! Interactive terminal chat.

use anyhow::{bail, Result};
use console::style;
use dialoguer::Input;
use tokio_util::sync::CancellationToken;

use super::commands::{help_text, ChatCommand};
use super::turn::{TurnError, TurnRunner};
use crate::config::Config;
use crate::render::{create_renderer, ChatRenderer};
use crate::sessions::ChatSession;

/// Settings for one terminal chat run.
#[derive(Debug, Clone, Default)]
pub struct ChatArgs {
    /// Send one message, print the reply, and exit.
    pub message: Option<String>,
    /// Persona to pin before the first turn.
    pub persona: Option<String>,
}

/// Resolve a full id or unique prefix against the session's conversations.
pub fn resolve_conversation_id(session: &ChatSession, prefix: &str) -> Result<String> {
    let prefix = prefix.trim();
    if session.conversation(prefix).is_some() {
        return Ok(prefix.to_string());
    }

    let matches: Vec<String> = session
        .list_recent(usize::MAX)
        .into_iter()
        .filter(|c| c.id.starts_with(prefix))
        .map(|c| c.id.clone())
        .collect();

    match matches.as_slice() {
        [id] => Ok(id.clone()),
        [] => bail!("no conversation matches '{prefix}'"),
        _ => bail!(
            "'{prefix}' matches {} conversations, use a longer prefix",
            matches.len()
        ),
    }
}

/// Run a turn, cancelling it on Ctrl-C.
async fn run_turn_interruptible(
    runner: &TurnRunner,
    session: &mut ChatSession,
    text: &str,
    renderer: &dyn ChatRenderer,
) {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    match runner.run(session, text, &cancel).await {
        Ok(report) => {
            println!(
                "{}\n",
                renderer.render_chat(std::slice::from_ref(&report.reply), runner.personas())
            );
        }
        Err(TurnError::Cancelled) => println!("{}\n", style("(cancelled)").dim()),
        Err(e) => println!("{}\n", style(e).red()),
    }

    watcher.abort();
}

fn read_line() -> Option<String> {
    Input::<String>::new()
        .with_prompt(style("you").cyan().bold().to_string())
        .allow_empty(true)
        .interact_text()
        .ok()
}

/// Apply one command. Returns `false` when the chat should end.
async fn handle_command(
    command: ChatCommand,
    runner: &TurnRunner,
    session: &mut ChatSession,
    renderer: &dyn ChatRenderer,
    recent_limit: usize,
) -> bool {
    let personas = runner.personas();
    match command {
        ChatCommand::Message(text) => {
            run_turn_interruptible(runner, session, &text, renderer).await;
        }
        ChatCommand::NewChat => {
            let id = session.start_new_conversation().to_string();
            println!("{} {}\n", style("Started conversation").green(), &id[..8.min(id.len())]);
        }
        ChatCommand::Load(prefix) => {
            match resolve_conversation_id(session, &prefix)
                .and_then(|id| session.load_conversation(&id).map_err(Into::into))
            {
                Ok(()) => {
                    println!("{}\n", style(session.current_title()).bold());
                    println!("{}\n", renderer.render_chat(session.messages(), personas));
                }
                Err(e) => println!("{}\n", style(e).red()),
            }
        }
        ChatCommand::Pin(name) => match session.pin_agent(&name, personas) {
            Ok(()) => println!("{} {name}\n", style("Pinned").green()),
            Err(e) => println!(
                "{} (available: {})\n",
                style(e).red(),
                personas.names().join(", ")
            ),
        },
        ChatCommand::Unpin => {
            session.unpin_agent();
            println!("{}\n", style("Routing: automatic").green());
        }
        ChatCommand::History => {
            println!("{}\n", renderer.render_sidebar(&session.snapshot(recent_limit), personas));
        }
        ChatCommand::Clear => {
            session.clear_conversation();
            println!("{}\n", style("Conversation cleared").green());
        }
        ChatCommand::Personas => {
            for persona in personas.iter() {
                println!(
                    "  {} {}  {}",
                    persona.icon,
                    style(&persona.name).bold(),
                    style(&persona.description).dim()
                );
            }
            println!();
        }
        ChatCommand::Help => println!("{}\n", help_text()),
        ChatCommand::Invalid(msg) => println!("{}\n", style(msg).yellow()),
        ChatCommand::Quit => return false,
    }
    true
}

/// Run the terminal chat until `/quit` or end of input.
pub async fn run(config: &Config, runner: TurnRunner, args: ChatArgs) -> Result<()> {
    let renderer = create_renderer(config.chat.recent_agents_limit);
    let mut session = ChatSession::new();

    if let Some(ref name) = args.persona {
        session.pin_agent(name, runner.personas())?;
    }

    if let Some(message) = args.message {
        run_turn_interruptible(&runner, &mut session, &message, renderer.as_ref()).await;
        return Ok(());
    }

    println!(
        "{} v{} (provider: {}, model: {})",
        style("personachat").bold(),
        env!("CARGO_PKG_VERSION"),
        runner.provider_name(),
        runner.options().model.model
    );
    println!("Type a message, or /help for commands.\n");

    loop {
        let Some(line) = tokio::task::spawn_blocking(read_line).await? else {
            break;
        };
        let Some(command) = ChatCommand::parse(&line) else {
            continue;
        };
        if !handle_command(
            command,
            &runner,
            &mut session,
            renderer.as_ref(),
            config.chat.recent_limit,
        )
        .await
        {
            break;
        }
    }

    session.save_current();
    tracing::info!(
        session = %session.session_id(),
        conversations = session.conversation_count(),
        "Chat ended"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::Message;

    fn session_with_conversations(n: usize) -> (ChatSession, Vec<String>) {
        let mut session = ChatSession::new();
        let mut ids = Vec::new();
        for i in 0..n {
            ids.push(session.current_conversation_id().to_string());
            session.append_message(Message::user(format!("topic {i}")));
            session.start_new_conversation();
        }
        (session, ids)
    }

    #[test]
    fn resolves_full_id_and_prefix() {
        let (session, ids) = session_with_conversations(2);
        assert_eq!(resolve_conversation_id(&session, &ids[0]).unwrap(), ids[0]);
        assert_eq!(
            resolve_conversation_id(&session, &ids[1][..12]).unwrap(),
            ids[1]
        );
    }

    #[test]
    fn unknown_prefix_errors() {
        let (session, _) = session_with_conversations(1);
        let err = resolve_conversation_id(&session, "zzzz").unwrap_err();
        assert!(err.to_string().contains("no conversation"));
    }

    #[test]
    fn ambiguous_prefix_errors() {
        let (session, _) = session_with_conversations(3);
        let err = resolve_conversation_id(&session, "").unwrap_err();
        assert!(err.to_string().contains("matches 3"));
    }
}
