use clap::{Parser, Subcommand};
use orquesta_agents::{register_builtins, AgentRegistry};
use orquesta_checkpoint::FileCheckpointStore;
use orquesta_core::{EventType, ExecutionStatus, HumanDecision};
use orquesta_engine::{Orchestrator, OrchestratorConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "orquesta", about = "Orquesta — multi-agent orchestration")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "orquesta.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single query through the orchestrator
    Ask {
        query: String,
        /// Continue an existing session instead of starting a new one
        #[arg(short, long)]
        session: Option<Uuid>,
        /// Print node transitions and agent activity while the turn runs
        #[arg(long)]
        events: bool,
    },
    /// Interactive conversation loop
    Chat {
        /// Continue an existing session
        #[arg(short, long)]
        session: Option<Uuid>,
    },
    /// Manage registered agents
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },
}

#[derive(Subcommand)]
enum AgentAction {
    /// List registered agents and their capabilities
    List,
}

#[derive(Deserialize, Default)]
struct OrquestaConfig {
    #[serde(default = "default_data_dir")]
    data_dir: PathBuf,
    #[serde(default)]
    orchestrator: OrchestratorConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Missing config file means all-defaults; a broken one is an error.
    let config: OrquestaConfig = match tokio::fs::read_to_string(&cli.config).await {
        Ok(raw) => toml::from_str(&raw)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => OrquestaConfig::default(),
        Err(e) => {
            return Err(anyhow::anyhow!(
                "Failed to read config file '{}': {}",
                cli.config.display(),
                e
            ))
        }
    };

    let mut registry = AgentRegistry::new();
    register_builtins(&mut registry);
    info!(count = registry.len(), "Agents registered");

    match cli.command {
        Commands::Ask { query, session, events } => {
            let orchestrator = build_orchestrator(&config, registry).await?;
            let session_id = session.unwrap_or_else(Uuid::new_v4);
            run_query(&orchestrator, session_id, &query, events).await?;
            println!("\n[sesión {session_id}]");
        }
        Commands::Chat { session } => {
            let orchestrator = build_orchestrator(&config, registry).await?;
            let session_id = session.unwrap_or_else(Uuid::new_v4);
            println!("Sesión {session_id} — escribí tu consulta (\"salir\" para terminar).");
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                print_prompt("> ")?;
                let Some(line) = lines.next_line().await? else {
                    break;
                };
                let query = line.trim();
                if query.is_empty() {
                    continue;
                }
                if query.eq_ignore_ascii_case("salir") || query.eq_ignore_ascii_case("exit") {
                    break;
                }
                run_query(&orchestrator, session_id, query, false).await?;
            }
        }
        Commands::Agent { action } => match action {
            AgentAction::List => {
                let capabilities = registry.capabilities();
                if capabilities.is_empty() {
                    println!("No agents registered.");
                } else {
                    println!("Registered agents:");
                    for capability in &capabilities {
                        println!("  {} — {}", capability.name, capability.description);
                        if !capability.requires_approval_for.is_empty() {
                            let actions: Vec<String> = capability
                                .requires_approval_for
                                .iter()
                                .map(ToString::to_string)
                                .collect();
                            println!("    requires approval: {}", actions.join(", "));
                        }
                    }
                    println!("\nTotal: {} agent(s)", capabilities.len());
                }
            }
        },
    }

    Ok(())
}

async fn build_orchestrator(
    config: &OrquestaConfig,
    registry: AgentRegistry,
) -> anyhow::Result<Orchestrator> {
    let store = FileCheckpointStore::new(config.data_dir.join("sessions")).await?;
    let orchestrator = Orchestrator::new(
        config.orchestrator.clone(),
        Arc::new(registry),
        Arc::new(store),
    )?;
    Ok(orchestrator)
}

/// Run one turn, walking the human gate interactively until the session
/// leaves the paused state.
async fn run_query(
    orchestrator: &Orchestrator,
    session_id: Uuid,
    query: &str,
    events: bool,
) -> anyhow::Result<()> {
    let printer = if events {
        let stream = orchestrator.broadcaster().subscribe_stream(session_id).await;
        Some(tokio::spawn(print_events(stream)))
    } else {
        None
    };

    let outcome = orchestrator.run_turn(session_id, query).await?;
    let mut status = outcome.status;
    let mut response = outcome.response;
    let mut pending = outcome.pending;

    while status == ExecutionStatus::Paused {
        let description = pending
            .as_ref()
            .map(|p| p.description.clone())
            .unwrap_or_else(|| "acción pendiente".to_string());
        println!("⏸  Aprobación requerida: {description}");
        let decision = if ask_yes_no("¿Aprobar? [s/n] ").await? {
            HumanDecision::approve(session_id)
        } else {
            HumanDecision::reject(session_id, "rechazado desde la terminal")
        };
        let resolution = orchestrator.resolve_gate(decision).await?;
        response = resolution.response;
        let state = orchestrator
            .session_state(session_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("session {session_id} vanished mid-resume"))?;
        status = state.status;
        pending = match &state.gate {
            orquesta_core::GateStatus::Awaiting { pending, .. } => Some(pending.clone()),
            _ => None,
        };
    }

    if let Some(printer) = printer {
        printer.abort();
    }
    println!("{response}");
    Ok(())
}

async fn print_events(mut stream: BroadcastStream<orquesta_core::EventEnvelope>) {
    while let Some(event) = stream.next().await {
        let Ok(event) = event else {
            // Lagged subscriber: old events were dropped, keep rendering.
            continue;
        };
        let data = &event.data;
        match event.event_type {
            EventType::NodeTransition => {
                eprintln!(
                    "· {} → {}",
                    data["from"].as_str().unwrap_or("?"),
                    data["to"].as_str().unwrap_or("?")
                );
            }
            EventType::AgentStart => {
                eprintln!(
                    "▶ {} ({})",
                    data["agent"].as_str().unwrap_or("?"),
                    data["action"].as_str().unwrap_or("?")
                );
            }
            EventType::AgentEnd => {
                let ok = data["success"].as_bool().unwrap_or(false);
                let mark = if ok { "✔" } else { "✖" };
                match (&event.meta.routing_agent, &event.meta.target_agent) {
                    (Some(from), Some(to)) => eprintln!("{mark} {from} → {to}"),
                    _ => eprintln!("{mark} {}", data["agent"].as_str().unwrap_or("?")),
                }
            }
            EventType::Error => {
                eprintln!(
                    "! {}: {}",
                    data["agent"].as_str().unwrap_or("?"),
                    data["detail"].as_str().unwrap_or("")
                );
            }
        }
    }
}

async fn ask_yes_no(prompt: &str) -> anyhow::Result<bool> {
    print_prompt(prompt)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let answer = lines.next_line().await?.unwrap_or_default();
    let answer = answer.trim().to_lowercase();
    Ok(matches!(answer.as_str(), "s" | "si" | "sí" | "y" | "yes"))
}

fn print_prompt(prompt: &str) -> anyhow::Result<()> {
    use std::io::Write;
    print!("{prompt}");
    std::io::stdout().flush()?;
    Ok(())
}
