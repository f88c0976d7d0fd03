use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use outreach_pipeline::clock::SystemClock;
use outreach_pipeline::config::EngineConfig;
use outreach_pipeline::engine::{EngineDeps, OutreachEngine, TransitionOutcome};
use outreach_pipeline::generation::{HttpMessageGenerator, MessageGenerator};
use outreach_pipeline::leads::{LeadStatus, OutreachMethod, TransitionRequest};
use outreach_pipeline::snapshot::CampaignSnapshot;
use outreach_pipeline::store::{Database, LibSqlBackend};

#[derive(Parser)]
#[command(name = "outreach-pipeline", version, about = "Outreach pipeline engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import a campaign snapshot
    Import {
        /// Snapshot JSON file
        path: PathBuf,
    },
    /// List the operator's leads, best first
    Leads,
    /// Show today's todos
    Todos,
    /// Mark a todo done for today
    Complete { todo_id: String },
    /// Show generation usage
    Usage,
    /// Snooze a lead's follow-ups
    Snooze { lead_id: Uuid, days: u32 },
    /// Move a lead to a new status
    Transition {
        lead_id: Uuid,
        status: LeadStatus,
        /// Channel used, required when first contacting a lead
        channel: Option<OutreachMethod>,
        /// Confirm a rejection that deletes the lead
        #[arg(long)]
        confirm: bool,
    },
    /// Generate outreach copy
    Generate {
        lead_id: Uuid,
        channel: OutreachMethod,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = EngineConfig::from_env()?;

    eprintln!("📬 Outreach Pipeline v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Operator: {}", config.operator_id);
    eprintln!("   Timezone: {}", config.timezone);
    eprintln!("   Database: {}", config.db_path.display());

    // ── Database ─────────────────────────────────────────────────────────
    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("opening database at {}", config.db_path.display()))?,
    );

    // ── Generator ────────────────────────────────────────────────────────
    let generator: Option<Arc<dyn MessageGenerator>> = match &config.generator {
        Some(generator_config) => {
            eprintln!("   Generator: {}", generator_config.base_url);
            Some(Arc::new(HttpMessageGenerator::new(generator_config)?))
        }
        None => None,
    };
    eprintln!();

    let engine = OutreachEngine::new(
        &config,
        EngineDeps {
            db,
            clock: Arc::new(SystemClock::new(config.timezone)),
            generator,
        },
    )
    .await?;

    match cli.command {
        Command::Import { path } => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let snapshot: CampaignSnapshot = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", path.display()))?;
            let (campaign, count) = engine.import(snapshot).await?;
            print_json(&serde_json::json!({ "campaign": campaign, "leads": count }))?;
        }
        Command::Leads => print_json(&engine.leads().await)?,
        Command::Todos => print_json(&engine.todos().await)?,
        Command::Complete { todo_id } => {
            let changed = engine.complete_todo(&todo_id).await?;
            print_json(&serde_json::json!({ "todo_id": todo_id, "changed": changed }))?;
        }
        Command::Usage => print_json(&engine.usage().await?)?,
        Command::Snooze { lead_id, days } => print_json(&engine.snooze(lead_id, days).await?)?,
        Command::Transition {
            lead_id,
            status,
            channel,
            confirm,
        } => {
            let mut request = TransitionRequest::to(status);
            if let Some(channel) = channel {
                request = request.with_channel(channel);
            }
            if confirm {
                request = request.confirmed();
            }

            match engine.transition(lead_id, request).await? {
                TransitionOutcome::Updated(lead) => print_json(&lead)?,
                TransitionOutcome::Deleted(id) => {
                    print_json(&serde_json::json!({ "deleted": id }))?
                }
            }
        }
        Command::Generate { lead_id, channel } => {
            let message = engine.generate_message(lead_id, channel).await?;
            print_json(&message)?;
        }
    }

    Ok(())
}
