//! The scheduler's CLI: the minimal harness that wires the core to its
//! external collaborators and runs the event loop. Not the change poller,
//! not the comparison worker — just enough to run the core as a process.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::Sender;

use crate::change::Change;
use crate::collaborators::http::{HttpComparisonBuilder, HttpPushHistory, HttpTreeBuilder};
use crate::collaborators::LoggingComparisonBuilder;
use crate::config::SchedulerConfig;
use crate::external::{ComparisonBuilder, PushHistory, TreeBuilder};
use crate::loader::parse_tree_registry_file;
use crate::logging;
use crate::scheduler::SchedulerState;

#[derive(Debug, Parser)]
#[clap(name = "l10n-scheduler", version, about)]
pub struct Options {
    #[clap(flatten)]
    pub global: GlobalOptions,

    /// Path to the tree-registry file (§6).
    pub tree_registry: PathBuf,

    /// Path to an optional scheduler config TOML file.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Base URL the build system's comparison/reload submission endpoint
    /// lives at.
    #[clap(long, default_value = "http://localhost:8041/submit")]
    pub build_endpoint: String,

    /// Base URL of the push-log JSON API.
    #[clap(long, default_value = "http://localhost:8040/pushes")]
    pub push_log: String,

    /// Print the buildsets that would be submitted instead of submitting
    /// them to the real build system.
    #[clap(long)]
    pub dry_run: bool,
}

#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Sets verbosity level. Can be specified multiple times.
    #[clap(long("verbose"), short, global(true), action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Set color behavior. Valid values are auto, always, and never.
    #[clap(long("color"), global(true), default_value("auto"))]
    pub color: ColorChoice,
}

#[derive(Debug, Clone, Copy)]
pub enum ColorChoice {
    Auto,
    Always,
    Never,
}

impl FromStr for ColorChoice {
    type Err = ColorChoiceParseError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        match source {
            "auto" => Ok(ColorChoice::Auto),
            "always" => Ok(ColorChoice::Always),
            "never" => Ok(ColorChoice::Never),
            _ => Err(ColorChoiceParseError),
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid color choice, expected one of: auto, always, never")]
pub struct ColorChoiceParseError;

impl Options {
    pub async fn run(self) -> anyhow::Result<()> {
        let _guard = logging::init_logging(self.global.verbosity, self.global.color);

        let config = match &self.config {
            Some(path) => SchedulerConfig::load_from_file(path)?,
            None => SchedulerConfig::default(),
        };

        let entries = parse_tree_registry_file(&self.tree_registry)?;
        let tree_names: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();

        let http_client = reqwest::Client::new();
        let tree_builder: Arc<dyn TreeBuilder> =
            Arc::new(HttpTreeBuilder::new(http_client.clone(), entries));
        let push_history: Arc<dyn PushHistory> =
            Arc::new(HttpPushHistory::new(http_client.clone(), self.push_log));
        let comparison_builder: Arc<dyn ComparisonBuilder> = if self.dry_run {
            Arc::new(LoggingComparisonBuilder)
        } else {
            Arc::new(HttpComparisonBuilder::new(http_client, self.build_endpoint))
        };

        let state = Arc::new(SchedulerState::new(
            tree_builder,
            comparison_builder,
            push_history,
            config,
        ));

        state.load_initial_trees(&tree_names).await?;

        let (sender, receiver) = tokio::sync::mpsc::channel(256);
        let local = tokio::task::LocalSet::new();

        local
            .run_until(async move {
                tokio::task::spawn_local(read_changes_from_stdin(sender));

                tokio::select! {
                    _ = state.run(receiver) => {}
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("interrupt received, shutting down");
                    }
                }
            })
            .await;

        Ok(())
    }
}

/// Reads newline-delimited JSON change records from stdin and forwards them
/// to the scheduler. This is the CLI harness's stand-in for the real change
/// source (a push-database poller, §1 Out of scope); it exists so the
/// process is runnable end to end without a full production deployment.
async fn read_changes_from_stdin(sender: Sender<Change>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Change>(line) {
                    Ok(change) => {
                        if sender.send(change).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        tracing::warn!(%error, "failed to parse change record");
                    }
                }
            }
            Ok(None) => break,
            Err(error) => {
                tracing::error!(%error, "failed to read from stdin");
                break;
            }
        }
    }
}
