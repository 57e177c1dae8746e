mod cli;

use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use healthchat::app::{AppConfig, AppState};
use healthchat::chat::ChatEvent;
use healthchat::platform::{AppPaths, CredentialStore};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = match &cli.config_dir {
        Some(dir) => AppPaths::with_root(dir),
        None => AppPaths::new()?,
    };
    paths
        .ensure_dirs_exist()
        .context("Failed to create application directories")?;

    // The subscriber depends on the loaded config, so loading is logged afterwards.
    let (config, created) = AppConfig::load_or_create(&paths)
        .await
        .context("Failed to load configuration")?;
    let _log_guard = init_logging(&paths, &config, cli.debug)?;

    info!("Starting HealthChat {}", env!("CARGO_PKG_VERSION"));
    if created {
        info!("Created default configuration at {:?}", paths.config_file());
    } else {
        info!("Loaded configuration from {:?}", paths.config_file());
    }

    let state = AppState::new(config, paths, CredentialStore::new());

    match cli.command.unwrap_or_else(Commands::default_chat) {
        Commands::Chat { patient, endpoint } => run_chat(state, patient, endpoint).await,
        Commands::Token { set, remove } => manage_token(&state, set, remove).await,
        Commands::Config => show_config(&state),
    }
}

/// Logs go to a daily file under the data dir so stdout stays free for chat output.
fn init_logging(paths: &AppPaths, config: &AppConfig, debug: bool) -> Result<Option<WorkerGuard>> {
    let level = if debug { "debug" } else { config.logging.level.as_str() };
    let filter = EnvFilter::from_default_env().add_directive(format!("healthchat={level}").parse()?);

    if config.logging.file_logging {
        let appender = tracing_appender::rolling::daily(paths.logs_dir(), "healthchat.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Ok(Some(guard))
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(None)
    }
}

async fn run_chat(mut state: AppState, patient: Option<String>, endpoint: Option<String>) -> Result<()> {
    if let Some(patient) = patient {
        state.config_mut().chat.patient_id = Some(patient);
    }
    if let Some(endpoint) = endpoint {
        state.config_mut().backend.endpoint = endpoint;
    }
    state.config().validate()?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = state.build_client(tx).await?;
    let show_conversation_id = state.config().chat.show_conversation_id;

    let notifier = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            render_event(event, show_conversation_id);
        }
    });

    println!("HealthChat - type a message, /reset for a new conversation, /quit to exit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                client.reset();
                println!("Started a new conversation");
            }
            message => {
                let mut stdout = std::io::stdout();
                client
                    .send(
                        message,
                        |delta| {
                            let _ = write!(stdout, "{delta}");
                            let _ = stdout.flush();
                        },
                        || println!(),
                    )
                    .await;
            }
        }
    }

    drop(client);
    notifier.await?;
    info!("Chat session ended");
    Ok(())
}

fn render_event(event: ChatEvent, show_conversation_id: bool) {
    match event {
        ChatEvent::Error(message) => eprintln!("error: {message}"),
        ChatEvent::ConversationStarted(id) if show_conversation_id => {
            eprintln!("[conversation {id}]")
        }
        ChatEvent::ConversationStarted(_) => {}
        ChatEvent::LoadingChanged(loading) => debug!("Loading: {}", loading),
    }
}

async fn manage_token(state: &AppState, set: Option<String>, remove: bool) -> Result<()> {
    let credentials = state.credentials();

    if let Some(token) = set {
        credentials.store_token(&token).await?;
        println!("Backend token stored");
    } else if remove {
        credentials.delete_token().await?;
        println!("Backend token removed");
    } else {
        match credentials.retrieve_token().await? {
            Some(_) => println!("Backend token: stored in keyring"),
            None => println!("Backend token: not set"),
        }
    }

    Ok(())
}

fn show_config(state: &AppState) -> Result<()> {
    println!("# {}", state.paths().config_file().display());
    print!("{}", state.config().redacted().to_toml()?);
    Ok(())
}
