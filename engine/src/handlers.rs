//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - ask: Answer one question
//! - chat: Interactive consultation loop
//! - personas: List the persona table
//! - sessions / history / discard: Session management
//! - status: Provider and storage check
//! - score: Run the quality heuristic over arbitrary text

use anyhow::{Context, Result};
use sdk::errors::{EngineError, LegalMindErrorExt};
use sdk::types::{AggregatedResponse, Session};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::{AgentClient, AgentInvoker};
use crate::conductor::{Orchestrator, QualityScorer, TextFeatures};
use crate::config::{Config, StoreKind};
use crate::db::Database;
use crate::llm::{build_provider, ChatProvider};
use crate::personas::PersonaTable;
use crate::secrets::PiiScrubber;
use crate::session::{InMemorySessionStore, SessionStore};

const CHAT_PROMPT: &str = "Legal Query > ";

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Open the session store selected by `[session] store`
pub async fn open_store(config: &Config) -> Result<Arc<dyn SessionStore>> {
    match config.session.store {
        StoreKind::Memory => Ok(Arc::new(InMemorySessionStore::new())),
        StoreKind::Sqlite => {
            let database = Database::new(&config.db_path())
                .await
                .context("Failed to open database")?;
            Ok(Arc::new(database.sessions()))
        }
    }
}

/// Wire the full pipeline from configuration
pub async fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let personas = PersonaTable::from_config(&config.personas).await?;
    let provider = build_provider(&config.llm)?;
    info!(
        "Using provider {} ({} personas)",
        provider.name(),
        personas.len()
    );

    if sends_raw_queries_off_machine(provider.as_ref(), config) {
        warn!(
            "Queries go to hosted provider {} unscrubbed; set [privacy] scrub_queries = true to remove personal data",
            provider.name()
        );
    }

    let invoker: Arc<dyn AgentInvoker> = Arc::new(AgentClient::new(
        provider,
        config.personas.history_window,
        Duration::from_secs(config.llm.timeout_secs),
    ));

    let orchestrator = Orchestrator::new(
        Arc::new(personas),
        invoker,
        open_store(config).await?,
        config.personas.coordination,
        QualityScorer::new(&config.quality),
    );

    Ok(if config.privacy.scrub_queries {
        info!("Scrubbing personal data from queries ({:?})", config.privacy.mode);
        orchestrator.with_scrubber(PiiScrubber::new(config.privacy.mode))
    } else {
        orchestrator
    })
}

/// True when queries leave this machine without passing the scrubber
pub fn sends_raw_queries_off_machine(provider: &dyn ChatProvider, config: &Config) -> bool {
    !provider.is_local() && !config.privacy.scrub_queries
}

/// Cancel `token` when Ctrl-C arrives. Abort the handle once the guarded
/// work is done.
fn cancel_on_ctrl_c(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling request");
            token.cancel();
        }
    })
}

/// Answer one question
pub async fn handle_ask(
    query: String,
    session: Option<String>,
    verbose: bool,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;

    let session_id = match session {
        Some(id) => id,
        None => orchestrator.new_session().await?,
    };

    let cancel = CancellationToken::new();
    let watcher = cancel_on_ctrl_c(cancel.clone());
    let result = orchestrator.ask(&session_id, &query, &cancel).await;
    watcher.abort();

    let response = result?;
    print_response(&response, orchestrator.scorer(), verbose, format)
}

/// Interactive consultation on one session
///
/// `exit` leaves, `reset` discards the session and starts a fresh one.
/// Recoverable errors are reported and the loop continues.
pub async fn handle_chat(session: Option<String>, config: &Config, format: OutputFormat) -> Result<()> {
    let orchestrator = build_orchestrator(config).await?;

    let session_id = match session {
        Some(id) => {
            orchestrator.store().get(&id).await?;
            id
        }
        None => orchestrator.new_session().await?,
    };

    if let OutputFormat::Text = format {
        println!("Legal Mind consultation (session {})", session_id);
        println!("Type 'reset' to start over, 'exit' to quit.");
        println!();
    }

    let Interrupts { mut rx, task } = Interrupts::listen();
    let result = run_chat(
        &orchestrator,
        session_id,
        BufReader::new(tokio::io::stdin()),
        &mut rx,
        format,
    )
    .await;
    task.abort();
    result
}

/// Every Ctrl-C for the lifetime of the REPL, as channel messages.
///
/// The signal handler is installed once. After that SIGINT no longer ends
/// the process, so the loop itself must react to each message.
struct Interrupts {
    rx: mpsc::UnboundedReceiver<()>,
    task: JoinHandle<()>,
}

impl Interrupts {
    fn listen() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if tx.send(()).is_err() {
                    break;
                }
            }
        });
        Self { rx, task }
    }
}

/// The chat loop over `input`.
///
/// An interrupt while waiting for input ends the loop. An interrupt while a
/// query is in flight cancels that query only.
pub async fn run_chat<R>(
    orchestrator: &Orchestrator,
    mut session_id: String,
    input: R,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
    format: OutputFormat,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    loop {
        // Interrupts that raced with the last answer are stale
        while interrupts.try_recv().is_ok() {}

        if let OutputFormat::Text = format {
            print!("{}", CHAT_PROMPT);
            std::io::stdout().flush()?;
        }

        let line = tokio::select! {
            line = lines.next_line() => line?,
            Some(()) = interrupts.recv() => {
                info!("Interrupted at the prompt, leaving chat");
                if let OutputFormat::Text = format {
                    println!();
                }
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            "exit" | "quit" => break,
            "reset" => {
                orchestrator.discard(&session_id).await?;
                session_id = orchestrator.new_session().await?;
                if let OutputFormat::Text = format {
                    println!("Started new session {}", session_id);
                }
                continue;
            }
            _ => {}
        }

        let cancel = CancellationToken::new();
        let ask = orchestrator.ask(&session_id, line, &cancel);
        tokio::pin!(ask);
        let result = tokio::select! {
            result = &mut ask => result,
            Some(()) = interrupts.recv() => {
                warn!("Interrupted, cancelling request");
                cancel.cancel();
                ask.await
            }
        };

        match result {
            Ok(response) => print_response(&response, orchestrator.scorer(), false, format)?,
            Err(e) if e.is_recoverable() => {
                debug!("Query failed: {}", e);
                eprintln!("{}", e.user_hint());
            }
            Err(e) => return Err(e.into()),
        }
    }

    if let OutputFormat::Text = format {
        println!("Goodbye.");
    }
    Ok(())
}

fn print_response(
    response: &AggregatedResponse,
    scorer: &QualityScorer,
    verbose: bool,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Text => {
            if verbose {
                for turn in &response.turns {
                    println!(
                        "--- {} (quality {}/10) ---",
                        turn.speaker(),
                        scorer.score(&turn.text, &response.query)
                    );
                    println!("{}", turn.text);
                    println!();
                }
                println!("=== Final Answer ===");
            }

            println!("{}", response.synthesized_text);
            println!();
            println!(
                "Quality Score: {}/10 ({})",
                response.quality_score, response.quality.confidence
            );

            if verbose {
                println!("Suggestions:");
                for suggestion in &response.quality.suggestions {
                    println!("  - {}", suggestion);
                }
            }

            println!(
                "Personas: {} | Session: {} | {:.1}s",
                response.personas().join(", "),
                response.session_id,
                response.elapsed_ms as f64 / 1000.0
            );
        }
        OutputFormat::Json => {
            let mut output = serde_json::to_value(response)?;
            if verbose {
                let turn_scores: Vec<_> = response
                    .turns
                    .iter()
                    .map(|t| {
                        json!({
                            "persona": t.speaker(),
                            "quality_score": scorer.score(&t.text, &response.query)
                        })
                    })
                    .collect();
                output["turn_scores"] = json!(turn_scores);
            }
            println!("{}", serde_json::to_string(&output)?);
        }
    }

    Ok(())
}

/// List personas in priority order
pub async fn handle_personas(config: &Config, format: OutputFormat) -> Result<()> {
    let table = PersonaTable::from_config(&config.personas).await?;
    let default = table.default_persona().name.clone();

    match format {
        OutputFormat::Text => {
            println!("Personas (priority order):");
            println!();
            for (i, persona) in table.iter().enumerate() {
                let marker = if persona.name == default { " (default)" } else { "" };
                println!("  {}. {} [{}]{}", i + 1, persona.name, persona.kind, marker);
                if !persona.description.is_empty() {
                    println!("     {}", persona.description);
                }
                if !persona.keyword_triggers.is_empty() {
                    let triggers: Vec<&str> =
                        persona.keyword_triggers.iter().map(String::as_str).collect();
                    println!("     Triggers: {}", triggers.join(", "));
                }
            }
            println!();
            println!("Coordination: {:?}", config.personas.coordination);
        }
        OutputFormat::Json => {
            let personas: Vec<_> = table
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    json!({
                        "priority": i + 1,
                        "name": p.name,
                        "kind": p.kind,
                        "description": p.description,
                        "triggers": p.keyword_triggers,
                        "default": p.name == default,
                    })
                })
                .collect();
            let output = json!({
                "personas": personas,
                "coordination": config.personas.coordination,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// List open sessions, newest first
pub async fn handle_sessions(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let store = open_store(config).await?;
    let sessions = store.list(limit).await?;

    match format {
        OutputFormat::Text => {
            if sessions.is_empty() {
                println!("No open sessions");
                return Ok(());
            }

            println!("Open sessions (last {}):", limit);
            println!();
            for s in &sessions {
                println!("Session ID: {}", s.id);
                println!("  Created: {}", s.created_at.format("%Y-%m-%d %H:%M:%S"));
                println!("  Turns: {}", s.turn_count);
                if let Some(last) = s.last_activity {
                    println!("  Last activity: {}", last.format("%Y-%m-%d %H:%M:%S"));
                }
                println!();
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "sessions": sessions,
                "count": sessions.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Print every turn of a session
pub async fn handle_history(session_id: String, config: &Config, format: OutputFormat) -> Result<()> {
    let store = open_store(config).await?;
    let session = store.get(&session_id).await?;

    match format {
        OutputFormat::Text => print_session(&session),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&session)?),
    }

    Ok(())
}

fn print_session(session: &Session) {
    println!("Session: {}", session.id);
    println!("Created: {}", session.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Turns: {}", session.len());
    println!();

    for turn in &session.turns {
        println!("[{}] {}:", turn.timestamp.format("%H:%M:%S"), turn.speaker());
        println!("{}", turn.text);
        println!();
    }
}

/// Close a session for good
pub async fn handle_discard(session_id: String, config: &Config, format: OutputFormat) -> Result<()> {
    let store = open_store(config).await?;
    store.discard(&session_id).await?;

    match format {
        OutputFormat::Text => println!("Session {} discarded.", session_id),
        OutputFormat::Json => println!("{}", json!({ "discarded": session_id })),
    }

    Ok(())
}

/// Report provider reachability, storage and persona table
pub async fn handle_status(config: &Config, format: OutputFormat) -> Result<()> {
    let mut checks: Vec<(String, String)> = Vec::new();
    let mut issues: Vec<String> = Vec::new();

    checks.push(("Provider".to_string(), config.llm.provider.clone()));
    match build_provider(&config.llm) {
        Ok(provider) => {
            let reachable = provider.check_health().await;
            checks.push((
                "Provider health".to_string(),
                if reachable { "Reachable" } else { "Unreachable" }.to_string(),
            ));
            checks.push((
                "Provider host".to_string(),
                if provider.is_local() { "local" } else { "hosted" }.to_string(),
            ));
            if !reachable {
                issues.push(format!("{} did not answer the health check", provider.name()));
            }
            if sends_raw_queries_off_machine(provider.as_ref(), config) {
                issues.push(
                    "Queries reach a hosted model unscrubbed ([privacy] scrub_queries = false)"
                        .to_string(),
                );
            }
        }
        Err(e) => {
            checks.push(("Provider health".to_string(), "Not configured".to_string()));
            issues.push(e.to_string());
        }
    }

    match PersonaTable::from_config(&config.personas).await {
        Ok(table) => {
            checks.push(("Personas".to_string(), table.len().to_string()));
            checks.push((
                "Default persona".to_string(),
                table.default_persona().name.clone(),
            ));
        }
        Err(e) => {
            checks.push(("Personas".to_string(), "Invalid".to_string()));
            issues.push(e.to_string());
        }
    }

    match open_store(config).await {
        Ok(store) => {
            checks.push(("Session store".to_string(), store.kind().to_string()));
        }
        Err(e) => {
            checks.push(("Session store".to_string(), "Unavailable".to_string()));
            issues.push(format!("{:#}", e));
        }
    }

    checks.push((
        "Query scrubbing".to_string(),
        if config.privacy.scrub_queries {
            format!("{:?}", config.privacy.mode).to_lowercase()
        } else {
            "off".to_string()
        },
    ));

    match format {
        OutputFormat::Text => {
            println!("Legal Mind Status");
            println!();
            for (name, value) in &checks {
                println!("  {:<16} {}", format!("{}:", name), value);
            }
            if !issues.is_empty() {
                println!();
                println!("Issues:");
                for issue in &issues {
                    println!("  - {}", issue);
                }
            }
        }
        OutputFormat::Json => {
            let checks: serde_json::Map<String, serde_json::Value> = checks
                .into_iter()
                .map(|(k, v)| (k, json!(v)))
                .collect();
            let output = json!({
                "version": env!("CARGO_PKG_VERSION"),
                "commit": env!("GIT_COMMIT_HASH"),
                "checks": checks,
                "issues": issues,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Score text from a file, or stdin when no file is given
pub async fn handle_score(
    file: Option<PathBuf>,
    query: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let text = match &file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("Failed to read stdin")?;
            buf
        }
    };
    let query = query.unwrap_or_default();

    let scorer = QualityScorer::new(&config.quality);
    let assessment = scorer.assess(&text, &query);
    let features = TextFeatures::extract(&text, &query);

    match format {
        OutputFormat::Text => {
            println!(
                "Quality Score: {}/10 ({})",
                assessment.score, assessment.confidence
            );
            println!(
                "  Headings: {} | Lists: {} | Citations: {} | Body words: {}",
                yes_no(features.has_headings),
                yes_no(features.has_lists),
                features.citations,
                features.body_words
            );
            if features.query_terms > 0 {
                println!(
                    "  Query terms covered: {}/{}",
                    features.query_terms_covered, features.query_terms
                );
            }
            println!("Suggestions:");
            for suggestion in &assessment.suggestions {
                println!("  - {}", suggestion);
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "assessment": assessment,
                "features": features,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Exit code for a failed command: 2 for provider failures, 1 otherwise
pub fn exit_code(error: &anyhow::Error) -> i32 {
    match engine_error(error) {
        Some(e) if e.as_invocation().is_some() => 2,
        _ => 1,
    }
}

/// The engine error behind `error`, if any
pub fn engine_error(error: &anyhow::Error) -> Option<&EngineError> {
    error.chain().find_map(|e| e.downcast_ref::<EngineError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::errors::InvocationError;

    #[test]
    fn invocation_failures_exit_with_two() {
        let err = anyhow::Error::from(EngineError::Invocation(InvocationError::Timeout(60)));
        assert_eq!(exit_code(&err), 2);

        let wrapped = anyhow::Error::from(EngineError::Invocation(InvocationError::Network(
            "refused".into(),
        )))
        .context("ask failed");
        assert_eq!(exit_code(&wrapped), 2);
    }

    #[test]
    fn other_failures_exit_with_one() {
        assert_eq!(exit_code(&anyhow::Error::from(EngineError::EmptyQuery)), 1);
        assert_eq!(exit_code(&anyhow::anyhow!("plain failure")), 1);
    }

    #[test]
    fn hosted_provider_without_scrubbing_is_flagged() {
        use crate::llm::{OllamaProvider, OpenAIProvider};
        use crate::secrets::SecretString;

        let mut config = Config::default_config();
        let hosted = OpenAIProvider::new(config.llm.openai.clone(), SecretString::new("sk-test"));
        let local = OllamaProvider::new("http://localhost:11434", "llama3.1:8b");

        assert!(sends_raw_queries_off_machine(&hosted, &config));
        assert!(!sends_raw_queries_off_machine(&local, &config));

        config.privacy.scrub_queries = true;
        assert!(!sends_raw_queries_off_machine(&hosted, &config));
    }

    /// Never answers; only cancellation ends a call
    struct Hanging;

    #[async_trait::async_trait]
    impl crate::agent::AgentInvoker for Hanging {
        async fn invoke(
            &self,
            _persona: &crate::personas::Persona,
            _query: &str,
            _history: &[sdk::types::Turn],
        ) -> std::result::Result<String, InvocationError> {
            std::future::pending().await
        }
    }

    async fn chat_orchestrator() -> Orchestrator {
        let table = PersonaTable::from_config(&crate::config::PersonasConfig::default())
            .await
            .unwrap();
        Orchestrator::new(
            Arc::new(table),
            Arc::new(Hanging),
            Arc::new(InMemorySessionStore::new()),
            crate::config::CoordinationPolicy::Always,
            QualityScorer::default(),
        )
    }

    #[tokio::test]
    async fn interrupt_at_the_prompt_ends_chat() {
        let orchestrator = chat_orchestrator().await;
        let id = orchestrator.new_session().await.unwrap();
        // Input stays open, so only the interrupt can end the loop
        let (_writer, reader) = tokio::io::duplex(64);
        let (tx, mut rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send(()).unwrap();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run_chat(&orchestrator, id, BufReader::new(reader), &mut rx, OutputFormat::Json),
        )
        .await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn interrupt_cancels_only_the_inflight_query() {
        use tokio::io::AsyncWriteExt;

        let orchestrator = chat_orchestrator().await;
        let id = orchestrator.new_session().await.unwrap();
        let (mut writer, reader) = tokio::io::duplex(64);
        let (tx, mut rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            writer.write_all(b"Is a DPIA required?\n").await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            tx.send(()).unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            writer.write_all(b"exit\n").await.unwrap();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run_chat(
                &orchestrator,
                id.clone(),
                BufReader::new(reader),
                &mut rx,
                OutputFormat::Json,
            ),
        )
        .await;

        // The loop survived the interrupt and left on "exit"
        assert!(matches!(result, Ok(Ok(()))));
        assert!(orchestrator.store().get(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn memory_store_is_selected_by_config() {
        let mut config = Config::default_config();
        config.session.store = StoreKind::Memory;
        let store = open_store(&config).await.unwrap();
        assert_eq!(store.kind(), "memory");
    }

    #[tokio::test]
    async fn sqlite_store_lives_in_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default_config();
        config.core.data_dir = dir.path().to_path_buf();

        let store = open_store(&config).await.unwrap();
        assert_eq!(store.kind(), "sqlite");
        assert!(config.db_path().exists());
    }
}
