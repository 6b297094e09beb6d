#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::assigning_clones,
    clippy::bool_to_int_with_if,
    clippy::case_sensitive_file_extension_comparisons,
    clippy::cast_possible_wrap,
    clippy::doc_markdown,
    clippy::field_reassign_with_default,
    clippy::float_cmp,
    clippy::implicit_clone,
    clippy::items_after_statements,
    clippy::map_unwrap_or,
    clippy::manual_let_else,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::needless_raw_string_hashes,
    clippy::redundant_closure_for_method_calls,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::unused_self,
    clippy::cast_precision_loss,
    clippy::unnecessary_cast,
    clippy::unnecessary_lazy_evaluations,
    clippy::unnecessary_literal_bound,
    clippy::unnecessary_map_or,
    clippy::unnecessary_wraps,
)]

use anyhow::{bail, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use console::style;
use personachat::agent::{self, create_turn_runner, ChatArgs};
use personachat::{gateway, providers, Config};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn parse_temperature(s: &str) -> std::result::Result<f64, String> {
    let t: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if !(0.0..=2.0).contains(&t) {
        return Err("temperature must be between 0.0 and 2.0".to_string());
    }
    Ok(t)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    #[value(name = "bash")]
    Bash,
    #[value(name = "fish")]
    Fish,
    #[value(name = "zsh")]
    Zsh,
    #[value(name = "powershell")]
    PowerShell,
    #[value(name = "elvish")]
    Elvish,
}

/// `personachat` - chat with a team of keyword-routed AI personas.
#[derive(Parser, Debug)]
#[command(name = "personachat")]
#[command(version)]
#[command(about = "Chat with a team of AI personas, routed by topic.", long_about = None)]
struct Cli {
    /// Directory holding config.toml (default: ~/.personachat)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start an interactive chat
    #[command(long_about = "\
Start an interactive chat.

Each message is routed to the persona whose keywords it matches best \
(Travel Agent, Tech Expert, Health Advisor, or General Assistant). \
Use /pin to keep one persona, /new to start over, and /help for the \
full command list. Use --message for a single question without \
entering interactive mode.

Examples:
  personachat chat                                  # interactive session
  personachat chat -m \"Best time to visit Kyoto?\"   # single message
  personachat chat --persona \"Tech Expert\"
  personachat chat -p echo                          # offline, no API key")]
    Chat {
        /// Single message mode (don't enter interactive mode)
        #[arg(short, long)]
        message: Option<String>,

        /// Pin a persona for the whole session
        #[arg(long)]
        persona: Option<String>,

        /// Provider to use (openai, echo, custom:<URL>)
        #[arg(short, long)]
        provider: Option<String>,

        /// Model to use
        #[arg(long)]
        model: Option<String>,

        /// Temperature (0.0 - 2.0)
        #[arg(short, long, value_parser = parse_temperature)]
        temperature: Option<f64>,
    },

    /// Start the HTTP JSON gateway
    #[command(long_about = "\
Start the HTTP JSON gateway.

Serves the chat session API (create sessions, send messages, pin \
personas, switch conversations). Bind address defaults to the values \
in your config file (gateway.host / gateway.port).

Examples:
  personachat serve                  # use config defaults
  personachat serve -p 8080          # listen on port 8080
  personachat serve --host 0.0.0.0   # bind to all interfaces
  personachat serve -p 0             # random available port")]
    Serve {
        /// Port to listen on (use 0 for random available port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
    },

    /// List personas and their routing keywords
    Personas,

    /// List supported model providers
    Providers,

    #[command(long_about = "\
Manage personachat configuration.

Use 'schema' to dump the full JSON Schema for the config file, which \
documents every available key, type, and default value.

Examples:
  personachat config schema              # print JSON Schema to stdout
  personachat config schema > schema.json")]
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },

    #[command(long_about = "\
Generate shell completion scripts for `personachat`.

The script is printed to stdout so it can be sourced directly:

Examples:
  source <(personachat completions bash)
  personachat completions zsh > ~/.zfunc/_personachat
  personachat completions fish > ~/.config/fish/completions/personachat.fish")]
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Dump the full configuration JSON Schema to stdout
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.as_os_str().is_empty() {
            bail!("--config-dir cannot be empty");
        }
    }

    // Completions and schema must remain stdout-only and should not load config or initialize logging.
    match &cli.command {
        Commands::Completions { shell } => {
            let mut stdout = std::io::stdout().lock();
            return write_shell_completion(*shell, &mut stdout);
        }
        Commands::Config {
            config_command: ConfigCommands::Schema,
        } => {
            let schema = schemars::schema_for!(Config);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            return Ok(());
        }
        _ => {}
    }

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = Config::load_or_init(cli.config_dir.as_deref()).await?;

    match cli.command {
        Commands::Completions { .. } | Commands::Config { .. } => unreachable!(),

        Commands::Chat {
            message,
            persona,
            provider,
            model,
            temperature,
        } => {
            if let Some(provider) = provider {
                config.default_provider = Some(provider);
            }
            if let Some(model) = model {
                config.default_model = Some(model);
            }
            if let Some(temperature) = temperature {
                config.default_temperature = temperature;
            }
            let runner = create_turn_runner(&config)?;
            agent::run(&config, runner, ChatArgs { message, persona }).await
        }

        Commands::Serve { port, host } => {
            if let Some(port) = port {
                config.gateway.port = port;
            }
            if let Some(host) = host {
                config.gateway.host = host;
            }
            config.validate()?;
            if config.gateway.port == 0 {
                info!("Starting personachat gateway on {} (random port)", config.gateway.host);
            } else {
                info!(
                    "Starting personachat gateway on {}:{}",
                    config.gateway.host, config.gateway.port
                );
            }
            let runner = create_turn_runner(&config)?;
            gateway::run_gateway(&config, runner).await
        }

        Commands::Personas => {
            let personas = agent::persona_set_from(&config.personas)?;
            println!("Personas ({} total):\n", personas.len());
            for persona in personas.iter() {
                println!(
                    "  {} {}  {}",
                    persona.icon,
                    style(&persona.name).bold(),
                    style(&persona.description).dim()
                );
                if persona.keywords.is_empty() {
                    println!("      keywords: (fallback for unmatched questions)");
                } else {
                    println!("      keywords: {}", persona.keywords.join(", "));
                }
            }
            Ok(())
        }

        Commands::Providers => {
            let providers = providers::list_providers();
            let current = config
                .default_provider
                .as_deref()
                .unwrap_or("openai")
                .trim()
                .to_ascii_lowercase();
            println!("Supported providers ({} total):\n", providers.len());
            println!("  ID (use in config)  DESCRIPTION");
            println!("  ─────────────────── ───────────");
            for p in &providers {
                let is_active = p.name.eq_ignore_ascii_case(&current)
                    || p.aliases
                        .iter()
                        .any(|alias| alias.eq_ignore_ascii_case(&current));
                let marker = if is_active { " (active)" } else { "" };
                let local_tag = if p.local { " [local]" } else { "" };
                let aliases = if p.aliases.is_empty() {
                    String::new()
                } else {
                    format!("  (aliases: {})", p.aliases.join(", "))
                };
                println!(
                    "  {:<19} {}{}{}{}",
                    p.name, p.display_name, local_tag, marker, aliases
                );
            }
            println!("\n  custom:<URL>        Any OpenAI-compatible endpoint");
            Ok(())
        }
    }
}

fn write_shell_completion<W: Write>(shell: CompletionShell, writer: &mut W) -> Result<()> {
    use clap_complete::generate;
    use clap_complete::shells;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, bin_name.clone(), writer),
        CompletionShell::PowerShell => {
            generate(shells::PowerShell, &mut cmd, bin_name.clone(), writer);
        }
        CompletionShell::Elvish => generate(shells::Elvish, &mut cmd, bin_name, writer),
    }

    writer.flush()?;
    Ok(())
}
