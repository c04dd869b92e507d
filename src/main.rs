use std::io::Write as _;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use termpilot::{
    Config,
    cli::{
        Cli, Commands, ConfigCommands, MemoryCommands, auth,
        repl::{Exit, Repl, TerminalConfirm, format_session_list, render_event},
    },
    core::{Stores, build_agent, session::Session},
};

/// Exit status after Ctrl-C.
const INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let message = cli.message();

    let Some(command) = cli.command else {
        return chat(message, cli.mode, None).await;
    };

    match command {
        Commands::Version => {
            println!("termpilot {}", env!("CARGO_PKG_VERSION"));
        }

        Commands::Resume { session_id } => {
            let stores = Stores::open()?;
            let session = match session_id {
                Some(id) => stores.sessions.load(&id)?,
                None => {
                    let cwd = std::env::current_dir()?;
                    stores
                        .sessions
                        .most_recent_for(&cwd)?
                        .ok_or_else(|| anyhow::anyhow!("no saved session for {}", cwd.display()))?
                }
            };
            chat(None, cli.mode, Some(session)).await?;
        }

        Commands::Sessions { limit } => {
            let stores = Stores::open()?;
            print!("{}", format_session_list(&stores.sessions.list()?, limit));
        }

        Commands::Export { session_id, output } => {
            let stores = Stores::open()?;
            let session = match session_id {
                Some(id) => stores.sessions.load(&id)?,
                None => stores
                    .sessions
                    .list()?
                    .into_iter()
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("no saved sessions"))?,
            };
            let path = output.unwrap_or_else(|| {
                termpilot::core::session::default_export_name(&session.id, chrono::Utc::now())
            });
            std::fs::write(&path, termpilot::core::session::format_as_markdown(&session))?;
            println!("Exported session to {path}");
        }

        Commands::Memory { command } => {
            handle_memory_command(command.unwrap_or(MemoryCommands::List))?;
        }

        Commands::Login { api_key } => {
            auth::login(api_key)?;
        }

        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let config = Config::load()?;
                println!("{}", toml::to_string_pretty(&config)?);
            }
            ConfigCommands::Path => {
                let path = Config::config_path()?;
                println!("{}", path.display());
            }
        },
    }

    Ok(())
}

/// Start the interactive loop, or run one message when given.
async fn chat(
    message: Option<String>,
    mode: Option<agent_core::permission::PermissionMode>,
    resumed: Option<Session>,
) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(mode) = mode {
        config.ui.default_mode = mode;
    }

    let api_key = auth::ensure_api_key(&config.agent)?;
    let provider = config.agent.create_provider(&api_key)?;
    let stores = Stores::open()?;
    let cwd = std::env::current_dir()?;
    let mut agent = build_agent(&config, provider, cwd, &stores)?;

    let Some(message) = message else {
        let mut repl = Repl::new(agent, stores, &config, resumed);
        if repl.run().await? == Exit::Interrupted {
            // a pending stdin read would keep the runtime from shutting down
            std::process::exit(INTERRUPTED);
        }
        return Ok(());
    };

    let mut thinking = config
        .ui
        .show_thinking
        .then(|| termpilot::cli::thinking::Thinking::start("Thinking..."));
    let mut stdout = std::io::stdout();
    let outcome = tokio::select! {
        result = agent.chat(
            &message,
            |event| render_event(event, &mut thinking, &mut stdout),
            &TerminalConfirm,
        ) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    drop(thinking);
    println!();
    std::io::stdout().flush()?;

    match outcome {
        Some(result) => {
            result?;
            Ok(())
        }
        None => std::process::exit(INTERRUPTED),
    }
}

fn handle_memory_command(command: MemoryCommands) -> anyhow::Result<()> {
    let stores = Stores::open()?;
    let mut memory = stores.memory.load()?;

    match command {
        MemoryCommands::List => {
            if memory.is_empty() {
                println!("No memories");
            } else {
                println!("{}", memory.to_prompt_lines());
            }
            return Ok(());
        }
        MemoryCommands::Set { key, value } => {
            memory.remember(key.clone(), value);
            println!("Remembered: {key}");
        }
        MemoryCommands::Forget { key } => {
            if memory.forget(&key).is_some() {
                println!("Forgot: {key}");
            } else {
                println!("Not found: {key}");
            }
        }
        MemoryCommands::Clear => {
            memory = termpilot::core::memory::MemoryStore::new();
            println!("Memory cleared");
        }
    }

    stores.memory.save(&memory)?;
    Ok(())
}
