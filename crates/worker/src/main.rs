//! Command-line runner: turns one idea into a reel without the HTTP server.
//!
//! ```text
//! reelsmith-worker [IDEA...]          run a new idea (default idea if none)
//! reelsmith-worker -                  read the idea from stdin
//! reelsmith-worker --resume <RUN_ID>  resume a checkpointed run
//! reelsmith-worker --list             list checkpointed runs
//! ```
//!
//! The final video locator is printed to stdout; everything else goes to the
//! log. Ctrl-C cancels the run before its next scene.

use std::io::Read;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use reelsmith_core::RunFailure;
use reelsmith_events::{EventBus, PipelineEvent};
use reelsmith_pipeline::{PipelineConfig, PipelineOrchestrator, PipelineOutcome};
use reelsmith_provider::ProviderConfig;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

const DEFAULT_IDEA: &str = "A woman sits at her window watching a heavy rainstorm, finding \
                            peaceful joy in the cozy warmth of her dry indoor space.";

/// Turn one idea into a reel.
#[derive(Debug, Parser)]
#[command(name = "reelsmith-worker", about = "Turn one idea into a reel")]
struct Cli {
    /// Resume a checkpointed run
    #[arg(long, value_name = "RUN_ID", conflicts_with_all = ["list", "idea"])]
    resume: Option<Uuid>,
    /// List checkpointed runs
    #[arg(long, conflicts_with = "idea")]
    list: bool,
    /// The idea to film; `-` reads it from stdin
    #[arg(value_name = "IDEA", trailing_var_arg = true)]
    idea: Vec<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    /// Run `idea`; `None` means read it from stdin.
    Run { idea: Option<String> },
    Resume { run_id: Uuid },
    List,
}

impl Cli {
    fn command(self) -> Command {
        if let Some(run_id) = self.resume {
            return Command::Resume { run_id };
        }
        if self.list {
            return Command::List;
        }
        if self.idea == ["-"] {
            return Command::Run { idea: None };
        }
        let idea = self.idea.join(" ");
        let idea = if idea.trim().is_empty() {
            DEFAULT_IDEA.to_string()
        } else {
            idea
        };
        Command::Run { idea: Some(idea) }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reelsmith_worker=info,reelsmith_pipeline=info".into()),
        )
        .with(json_logs.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();

    let command = Cli::parse().command();

    let provider = ProviderConfig::from_env().context("Invalid provider configuration")?;
    let pipeline = PipelineConfig::from_env().context("Invalid pipeline configuration")?;
    let events = Arc::new(EventBus::default());
    let event_log = tokio::spawn(log_events(events.subscribe()));
    let client = provider.build_client(pipeline.scene_count);
    let orchestrator = PipelineOrchestrator::new(client, pipeline, Arc::clone(&events));

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl-C received, stopping before the next scene");
                cancel.cancel();
            }
        }
    });

    let outcome = match command {
        Command::List => return list_runs(&orchestrator).await,
        Command::Run { idea } => {
            let idea = match idea {
                Some(idea) => idea,
                None => read_stdin()?,
            };
            let run = orchestrator.start(&idea)?;
            orchestrator.execute(&run, &cancel).await
        }
        Command::Resume { run_id } => {
            let store = orchestrator
                .checkpoints()
                .context("REELSMITH_CHECKPOINT_DIR must be set to resume runs")?;
            let mut run = store.load(run_id).await?;
            // A run that was still executing when its process died.
            if !run.status.is_finished() {
                let (scene, stage) = run.resume_point();
                let completed_scenes = run.completed_scenes();
                run.mark_cancelled(RunFailure {
                    scene,
                    stage,
                    message: "interrupted".to_string(),
                    completed_scenes,
                });
            }
            orchestrator
                .resume(&Arc::new(RwLock::new(run)), &cancel)
                .await
        }
    };

    drop(orchestrator);
    drop(events);
    let _ = event_log.await;

    report(outcome?);
    Ok(())
}

fn read_stdin() -> anyhow::Result<String> {
    let mut idea = String::new();
    std::io::stdin()
        .read_to_string(&mut idea)
        .context("Failed to read idea from stdin")?;
    Ok(idea)
}

async fn list_runs(orchestrator: &PipelineOrchestrator) -> anyhow::Result<()> {
    let store = orchestrator
        .checkpoints()
        .context("REELSMITH_CHECKPOINT_DIR must be set to list runs")?;
    for id in store.list().await? {
        match store.load(id).await {
            Ok(run) => println!(
                "{id}\t{:?}\t{}/{}\t{}",
                run.status,
                run.completed_scenes(),
                run.scenes().len(),
                run.idea
            ),
            Err(e) => tracing::warn!(run_id = %id, error = %e, "Unreadable checkpoint"),
        }
    }
    Ok(())
}

fn report(outcome: PipelineOutcome) {
    tracing::info!(
        run_id = %outcome.run_id,
        scenes = outcome.completed_scenes,
        "Reel finished",
    );
    println!("{}", outcome.final_video.locator);
}

async fn log_events(mut rx: broadcast::Receiver<PipelineEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => tracing::info!(
                event_type = %event.event_type,
                scene = ?event.scene_index.map(|s| s.get()),
                payload = %event.payload,
                "Progress",
            ),
            Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "Progress log lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
