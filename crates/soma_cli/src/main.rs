use anyhow::{Context, Result};
use clap::Parser;
use soma_agent::{spawn_lifecycle, AgentEvent, SomaAgent, TurnEvent};
use soma_core::SomaConfig;
use soma_memory::{FastEmbedder, LongTermStore, MemorySystem, ProfileStore};
use soma_reasoning::OllamaClient;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "soma.toml")]
    config: String,

    /// Override the primary chat model
    #[arg(short, long)]
    model: Option<String>,

    /// Override the SQLite memory path
    #[arg(long)]
    db: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let mut cfg = SomaConfig::load_or_default(&args.config);
    if let Some(model) = args.model {
        cfg.llm.model = model;
    }
    if let Some(db) = args.db {
        cfg.memory.db_path = db;
    }

    info!("Waking Soma...");

    // Collaborators. The embedder has no fallback variant, so a failure
    // here is fatal; the durable store falls back to the linear store
    // inside open().
    let embedder = Arc::new(FastEmbedder::new().context("Failed to initialize embedding model")?);
    let store = LongTermStore::open(&cfg.memory).await?;
    let memory = Arc::new(MemorySystem::new(&cfg.memory, store, embedder));
    let profile = ProfileStore::open(&cfg.memory.profile_path);
    let generator = Arc::new(OllamaClient::from_config(&cfg.llm)?);

    let agent = SomaAgent::new(cfg, generator, memory.clone(), profile);
    let _lifecycle = spawn_lifecycle(agent.clone());
    spawn_event_printer(&agent);

    println!("Soma is awake. Type '/status' for a snapshot, 'quit' to exit.");
    print!("> ");
    io::stdout().flush()?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed == "quit" || trimmed == "exit" {
            break;
        }

        if trimmed == "/status" {
            let snapshot = agent.snapshot().await;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            print!("> ");
            io::stdout().flush()?;
            continue;
        }

        if trimmed.is_empty() {
            print!("> ");
            io::stdout().flush()?;
            continue;
        }

        let mut rx = agent.start_turn(trimmed.to_string());
        print!("\nSoma: ");
        io::stdout().flush()?;
        while let Some(event) = rx.recv().await {
            match event {
                TurnEvent::Fragment(fragment) => {
                    print!("{}", fragment);
                    io::stdout().flush()?;
                }
                TurnEvent::Interrupted => {
                    println!(" [interrupted]");
                    break;
                }
                TurnEvent::Done => break,
            }
        }
        println!("\n");

        print!("> ");
        io::stdout().flush()?;
    }

    if let Err(e) = memory.flush().await {
        tracing::warn!("final memory flush failed: {}", e);
    }
    info!("Soma going to sleep.");
    Ok(())
}

/// Print life-cycle chatter (thoughts, proactive messages, logs) without
/// drowning the REPL: periodic status broadcasts are skipped.
fn spawn_event_printer(agent: &Arc<SomaAgent>) {
    let mut events = agent.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(AgentEvent::Thought(thought)) => println!("\n  (thinking: {})", thought),
                Ok(AgentEvent::Message(message)) => {
                    println!("\nSoma: {}", message);
                    print!("> ");
                    let _ = io::stdout().flush();
                }
                Ok(AgentEvent::Log(line)) => tracing::debug!("{}", line),
                Ok(AgentEvent::Status(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
