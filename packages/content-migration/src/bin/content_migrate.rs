//! Command-line front end for migrating a tree snapshot into a file index.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use content_migration::{
    Enumerator, FileIndexStore, IndexStore, JobId, JobRegistry, JobState, MigrationClients, MigrationConfig,
    MigrationJob, MigrationParams, SnapshotRepository,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "content-migrate")]
#[command(about = "Migrate a content tree into a search index")]
#[command(version)]
struct Cli {
    /// JSON export of the source tree
    #[arg(long, global = true, default_value = "tree.json")]
    snapshot: PathBuf,

    /// Directory holding indexed documents and job records
    #[arg(long, global = true, default_value = "index")]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Size the work-set without migrating anything
    Count(RootArgs),

    /// Start a migration and wait for it (Ctrl-C aborts)
    Run(RootArgs),

    /// Continue a persisted job, skipping nodes it already migrated
    Resume { job_id: JobId },

    /// Print a persisted job's summary
    Status { job_id: JobId },
}

#[derive(Args)]
#[command(group(ArgGroup::new("root").required(true).args(["category", "content", "version"])))]
struct RootArgs {
    /// Root category key
    #[arg(long)]
    category: Option<i64>,

    /// Root content key
    #[arg(long)]
    content: Option<i64>,

    /// Single version key
    #[arg(long)]
    version: Option<i64>,

    /// Recurse into child categories
    #[arg(long)]
    with_children: bool,

    /// Include content filed under each category
    #[arg(long)]
    with_content: bool,

    /// Include non-current versions
    #[arg(long)]
    with_versions: bool,
}

impl RootArgs {
    fn params(&self) -> Result<MigrationParams> {
        match (self.category, self.content, self.version) {
            (Some(key), _, _) => Ok(MigrationParams::category(
                key,
                self.with_children,
                self.with_content,
                self.with_versions,
            )),
            (_, Some(key), _) => Ok(MigrationParams::content(key, self.with_versions)),
            (_, _, Some(key)) => Ok(MigrationParams::version(key)),
            (None, None, None) => bail!("one of --category, --content or --version is required"),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,content_migration=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = MigrationConfig::from_env().context("Failed to load configuration")?;
    let store = Arc::new(FileIndexStore::new(&cli.store));

    match cli.command {
        Commands::Count(root) => {
            let source = SnapshotRepository::load(&cli.snapshot)
                .await
                .with_context(|| format!("Failed to load snapshot {}", cli.snapshot.display()))?;
            let keys = Enumerator::new(&source, &config).enumerate(&root.params()?).await?;
            println!("{}", keys.count());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run(root) => {
            let registry = registry(&cli.snapshot, store, config).await?;
            let job = registry.create_or_get(root.params()?, false).await?;
            println!("Job {}", job.job_id());
            drive(&registry, job).await
        }
        Commands::Resume { job_id } => {
            let registry = registry(&cli.snapshot, store, config).await?;
            let job = registry
                .create_or_get_by_job_id(job_id)
                .await
                .with_context(|| format!("Failed to resume job {job_id}"))?;
            drive(&registry, job).await
        }
        Commands::Status { job_id } => {
            let Some(data) = store.load_job_status(job_id).await? else {
                bail!("job not found: {job_id}");
            };
            println!("{}", serde_json::to_string_pretty(&data.summary())?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn registry(snapshot: &Path, store: Arc<FileIndexStore>, config: MigrationConfig) -> Result<JobRegistry> {
    let repository = Arc::new(
        SnapshotRepository::load(snapshot)
            .await
            .with_context(|| format!("Failed to load snapshot {}", snapshot.display()))?,
    );
    let clients = MigrationClients::new(repository.clone(), repository, store);
    Ok(JobRegistry::new(Arc::new(clients), config))
}

/// Run the job to a terminal state, aborting on Ctrl-C.
async fn drive(registry: &JobRegistry, job: Arc<MigrationJob>) -> Result<ExitCode> {
    job.run();

    let outcome = tokio::select! {
        outcome = job.wait() => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(job_id = %job.job_id(), "Interrupted, aborting");
            registry.abort(job.job_id()).await;
            job.wait().await
        }
    };

    println!("{}", serde_json::to_string_pretty(&job.summary())?);

    match outcome {
        Ok(JobState::Finished) => Ok(ExitCode::SUCCESS),
        Ok(state) => {
            eprintln!("Job {} ended {}", job.job_id(), state);
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e).with_context(|| format!("Job {} failed", job.job_id())),
    }
}
