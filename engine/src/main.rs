// Legal Mind
// Main entry point for the legal-mind binary

use clap::Parser;
use legal_mind_engine::cli::{Cli, Command};
use legal_mind_engine::config::Config;
use legal_mind_engine::handlers::{
    engine_error, exit_code, handle_ask, handle_chat, handle_discard, handle_history,
    handle_personas, handle_score, handle_sessions, handle_status, OutputFormat,
};
use legal_mind_engine::telemetry::init_telemetry_with_level;
use sdk::errors::LegalMindErrorExt;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("{:#}", e);
        match engine_error(&e) {
            Some(engine) => eprintln!("Error: {}\n{}", e, engine.user_hint()),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(exit_code(&e));
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the config file; RUST_LOG wins over both
    init_telemetry_with_level(cli.log.as_deref().unwrap_or(&config.core.log_level));

    tracing::info!(
        "Legal Mind v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Command::Ask {
            query,
            session,
            verbose,
        } => {
            tracing::debug!("Answering query ({} chars)", query.len());
            handle_ask(query, session, verbose, &config, format).await
        }

        Command::Chat { session } => {
            tracing::info!("Starting interactive consultation");
            handle_chat(session, &config, format).await
        }

        Command::Personas => handle_personas(&config, format).await,

        Command::Sessions { limit } => {
            tracing::debug!("Listing last {} sessions", limit);
            handle_sessions(limit, &config, format).await
        }

        Command::History { session_id } => handle_history(session_id, &config, format).await,

        Command::Discard { session_id } => {
            tracing::info!("Discarding session {}", session_id);
            handle_discard(session_id, &config, format).await
        }

        Command::Status => {
            tracing::info!("Checking status...");
            handle_status(&config, format).await
        }

        Command::Score { file, query } => handle_score(file, query, &config, format).await,
    }
}
