//! assetstage entry point.

mod config;
mod local_repo;
mod manifest;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use assetstage_protocol::{BatchOutcome, ContentId, ItemResult, UploadReport};
use assetstage_staging::{MemoryTracker, StagingCoordinator, StagingStatus};
use assetstage_upload::{UploadEvent, UploadExecutor};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;
use crate::local_repo::DirectoryRepository;
use crate::manifest::ManifestIndex;

#[derive(Parser, Debug)]
#[command(name = "assetstage", version)]
#[command(about = "Stage project assets and upload them to a content repository")]
struct Cli {
    /// Configuration file (defaults to the per-user location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stage the given assets and print what an upload would do
    Status {
        #[arg(required = true)]
        ids: Vec<String>,

        /// Check imported records against the repository
        #[arg(long)]
        check_remote: bool,
    },
    /// Stage the given assets and upload everything that changed
    Upload {
        #[arg(required = true)]
        ids: Vec<String>,

        /// Leave a dependency out of the upload
        #[arg(long = "ignore", value_name = "ID")]
        ignore: Vec<String>,
    },
}

/// Collaborators and coordinator wired from a [`CliConfig`].
struct Workspace {
    coordinator: StagingCoordinator,
    repository: Arc<DirectoryRepository>,
    tracker: Arc<MemoryTracker>,
    tracker_file: PathBuf,
}

impl Workspace {
    fn open(config: &CliConfig) -> anyhow::Result<Self> {
        // Containment checks compare absolute paths.
        let root = std::fs::canonicalize(&config.project_root).with_context(|| {
            format!("project root {} not found", config.project_root.display())
        })?;
        let index = Arc::new(ManifestIndex::load(
            root,
            &config.resolve(&config.manifest),
        )?);
        let tracker_file = config.resolve(&config.tracker_file);
        let tracker = Arc::new(
            MemoryTracker::load(&tracker_file)
                .with_context(|| format!("failed to load {}", tracker_file.display()))?,
        );
        let repository = Arc::new(DirectoryRepository::new(
            config.resolve(&config.repository_dir),
        ));
        info!(
            assets = index.len(),
            baselines = tracker.len(),
            "workspace opened"
        );

        let coordinator = StagingCoordinator::new(
            index,
            tracker.clone(),
            repository.clone(),
            config.settings.clone(),
        );
        Ok(Self {
            coordinator,
            repository,
            tracker,
            tracker_file,
        })
    }

    /// Selects `ids`, rebuilds the graph and resolves every status.
    async fn stage(
        &mut self,
        ids: &[String],
        ignore: &[String],
        check_remote: bool,
        cancel: &CancellationToken,
    ) -> anyhow::Result<StagingStatus> {
        for id in ids {
            self.coordinator.add_to_selection(id.as_str());
        }
        for id in ignore {
            self.coordinator.set_ignore(&ContentId::new(id.as_str()), true);
        }
        self.coordinator.regenerate().await?;
        Ok(self.coordinator.refresh_status(check_remote, cancel).await?)
    }

    /// Uploads every ready node, applies the report and saves the baselines.
    async fn upload(&mut self, cancel: &CancellationToken) -> anyhow::Result<UploadReport> {
        let assets = self.coordinator.generate_upload_assets();
        let mut executor = UploadExecutor::new(self.repository.clone(), self.tracker.clone())
            .with_concurrency(self.coordinator.settings().concurrency());

        let logger = executor.take_events().map(|mut events| {
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    log_event(&event);
                }
            })
        });

        let report = executor.upload(&assets, None, cancel).await;
        drop(executor);
        if let Some(logger) = logger {
            let _ = logger.await;
        }

        self.coordinator.apply_upload_report(&report);
        self.tracker.save(&self.tracker_file)?;
        Ok(report)
    }

    fn print_nodes(&self) {
        for node in self.coordinator.nodes() {
            let diff = node.diff().lines().next().unwrap_or_default();
            let marker = if node.is_ignored() { " (ignored)" } else { "" };
            println!(
                "{:<22} {:<24} {}{}  {}",
                node.resolved_status().label(),
                node.name(),
                node.content_id(),
                marker,
                diff
            );
        }
    }
}

fn log_event(event: &UploadEvent) {
    match event {
        UploadEvent::StageStarted { stage } => {
            info!(stage = stage.number(), name = stage.label(), "stage started");
        }
        UploadEvent::AssetStaged {
            content_id,
            identifier,
        } => info!(content_id = %content_id, record = %identifier, "record staged"),
        UploadEvent::AssetUploaded { content_id } => {
            info!(content_id = %content_id, "content uploaded");
        }
        UploadEvent::RollingBack { records } => warn!(records, "rolling back"),
        UploadEvent::StageCompleted { .. } | UploadEvent::Finished { .. } => {}
    }
}

fn print_status(status: &StagingStatus) {
    println!(
        "{} assets: {} new, {} updated, {} unchanged, {} ignored, {} errors",
        status.total, status.added, status.updated, status.skipped, status.ignored, status.errors
    );
    if status.can_upload() {
        println!("{} files ({} bytes) ready to upload", status.total_files, status.total_size);
    }
    if status.has_files_outside_project {
        println!("some files are outside the project root and cannot be uploaded");
    }
}

fn print_report(report: &UploadReport) {
    for item in &report.items {
        let record = item
            .identifier
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_default();
        println!("{:<12} {} {}", format!("{:?}", item.result), item.content_id, record);
    }
    match &report.outcome {
        BatchOutcome::Success => println!(
            "uploaded {} assets",
            report.count(ItemResult::Uploaded)
        ),
        BatchOutcome::Error(message) => println!("upload failed: {message}"),
        BatchOutcome::Cancelled => println!("upload cancelled"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting assetstage");

    let config = CliConfig::load(cli.config.as_deref())?;
    let mut workspace = Workspace::open(&config)?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling");
            ctrl_c.cancel();
        }
    });

    match cli.command {
        Command::Status { ids, check_remote } => {
            let status = workspace.stage(&ids, &[], check_remote, &cancel).await?;
            workspace.print_nodes();
            print_status(&status);
        }
        Command::Upload { ids, ignore } => {
            let status = workspace.stage(&ids, &ignore, true, &cancel).await?;
            workspace.print_nodes();
            print_status(&status);
            if !status.can_upload() {
                println!("nothing to upload");
                return Ok(());
            }

            let report = workspace.upload(&cancel).await?;
            print_report(&report);
            if !report.outcome.is_success() {
                anyhow::bail!("upload did not complete");
            }
        }
    }

    Ok(())
}
