use anyhow::Result;
use clap::{Parser, Subcommand};

use catchall_groups::config::Settings;

#[derive(Debug, Parser)]
#[command(
    name = "catchall-groups",
    version,
    about = "Relay catch-all Gmail traffic into per-address Workspace groups"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output structured JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    settings: Settings,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Poll the triage label and relay messages until an error occurs
    Run,
    /// Run a single poll and report how many messages were relayed
    Once,
    /// List the mailbox labels to help pick the triage label
    Labels,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    commands::dispatch(cli).await
}

mod commands {
    use anyhow::{Context, Result};
    use serde::Serialize;
    use tracing::info;

    use catchall_groups::bootstrap::{resolve_triage_label, Session};
    use catchall_groups::config::Settings;
    use catchall_groups::relay::PollScheduler;

    use super::{Cli, Commands};

    pub async fn dispatch(cli: Cli) -> Result<()> {
        match cli.command {
            Commands::Run => handle_run(&cli.settings).await,
            Commands::Once => handle_once(&cli.settings, cli.json).await,
            Commands::Labels => handle_labels(&cli.settings, cli.json).await,
        }
    }

    async fn connect(settings: &Settings) -> Result<Session> {
        Session::connect(settings)
            .await
            .context("authenticate against Google APIs")
    }

    async fn handle_run(settings: &Settings) -> Result<()> {
        let owner = settings.owner()?;
        let session = connect(settings).await?;
        let label_id = resolve_triage_label(session.api(), &settings.label)
            .await
            .with_context(|| format!("resolve triage label '{}'", settings.label))?;

        let relay = session.relay(&label_id, owner);
        let scheduler = PollScheduler::new(settings.poll_interval());
        info!(
            label = %settings.label,
            owner,
            interval_secs = scheduler.interval().as_secs(),
            "relaying catch-all messages"
        );
        scheduler
            .run_forever(&relay)
            .await
            .context("relay loop stopped")
    }

    async fn handle_once(settings: &Settings, json: bool) -> Result<()> {
        let owner = settings.owner()?;
        let session = connect(settings).await?;
        let label_id = resolve_triage_label(session.api(), &settings.label)
            .await
            .with_context(|| format!("resolve triage label '{}'", settings.label))?;

        let relay = session.relay(&label_id, owner);
        let stats = PollScheduler::new(settings.poll_interval())
            .run_until(&relay, |_| true)
            .await
            .context("poll triage label")?;

        if json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        } else {
            println!("Messages relayed: {}", stats.messages_relayed);
        }
        Ok(())
    }

    async fn handle_labels(settings: &Settings, json: bool) -> Result<()> {
        let session = connect(settings).await?;
        let labels = session.api().list_labels().await.context("list Gmail labels")?;

        if json {
            #[derive(Serialize)]
            struct LabelsPayload<'a> {
                triage_label: &'a str,
                labels: &'a [catchall_groups::google::gmail::Label],
            }
            let payload = LabelsPayload {
                triage_label: &settings.label,
                labels: &labels,
            };
            println!("{}", serde_json::to_string_pretty(&payload)?);
        } else if labels.is_empty() {
            println!("No labels found.");
        } else {
            println!("Labels");
            println!("======");
            for label in labels {
                println!(
                    "{}  {}  {}",
                    label.id,
                    label.name,
                    label.label_type.as_deref().unwrap_or("-")
                );
            }
        }
        Ok(())
    }
}
