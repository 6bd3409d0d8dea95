// ABOUTME: Entry point for the snapvault binary.
// ABOUTME: Parses CLI arguments, initializes tracing, and drives a SnapshotStore, printing JSON.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use snapvault_core::Payload;
use snapvault_store::{CreateOptions, RollbackOptions, SnapshotStore, StoreConfig, StoreError};

#[derive(Parser)]
#[command(name = "snapvault")]
#[command(about = "Versioned snapshot store for structured datasets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Store directory (overrides SNAPVAULT_HOME)
    #[arg(long, global = true)]
    home: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Store the JSON document in a file as a new version
    Create {
        file: PathBuf,

        #[arg(short, long)]
        branch: Option<String>,

        /// Store as a diff against the branch head
        #[arg(short, long)]
        incremental: bool,

        #[arg(short, long)]
        author: Option<String>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Print the reconstructed payload of a version
    Get { version_id: String },

    /// Print the catalog record of a version
    Show { version_id: String },

    /// List active versions, newest first
    List {
        #[arg(short, long)]
        branch: Option<String>,

        #[arg(short, long, default_value = "50")]
        limit: usize,

        #[arg(short, long, default_value = "0")]
        offset: usize,
    },

    /// Compare two versions
    Diff { from: String, to: String },

    /// Append a new version restoring the content of an older one
    Rollback {
        version_id: String,

        #[arg(short, long, default_value = "")]
        reason: String,

        #[arg(short, long)]
        author: Option<String>,

        /// Leave the branch head where it is
        #[arg(long)]
        keep_head: bool,
    },

    /// Fork a branch at an existing version
    Branch {
        name: String,
        from: String,

        #[arg(short, long)]
        author: Option<String>,

        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// List branches
    Branches,

    /// Apply retention to every branch
    Cleanup {
        /// Active versions to keep per branch (defaults to SNAPVAULT_MAX_VERSIONS)
        #[arg(short, long)]
        max: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("snapvault=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("snapvault {} starting up", env!("CARGO_PKG_VERSION"));

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!("command failed: {:?}", e);
            let kind = match e.downcast_ref::<StoreError>() {
                Some(store_error) => serde_json::json!(store_error.kind()),
                None => serde_json::json!("invalid_input"),
            };
            let report = serde_json::json!({
                "status": "error",
                "kind": kind,
                "message": format!("{e:#}"),
            });
            println!("{report:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = StoreConfig::from_env()?;
    if let Some(home) = cli.home {
        config.home = home;
    }
    let store = SnapshotStore::open(config)?;

    match cli.command {
        Commands::Create {
            file,
            branch,
            incremental,
            author,
            description,
        } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let value: serde_json::Value = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", file.display()))?;

            let mut options = CreateOptions::new()
                .metadata("source_file", serde_json::json!(file.display().to_string()));
            options.branch = branch;
            options.created_by = author;
            options.description = description;
            if incremental {
                options = options.incremental();
            }

            let payload = Payload::try_from(value)
                .map_err(StoreError::from)
                .with_context(|| format!("converting {}", file.display()))?;
            print_json(&store.create_version(payload, options).await?)
        }
        Commands::Get { version_id } => {
            let payload = store.get_version_data(&version_id).await?;
            print_json(&payload.to_json())
        }
        Commands::Show { version_id } => match store.get_version(&version_id).await? {
            Some(version) => print_json(&version),
            None => Err(StoreError::VersionNotFound(version_id).into()),
        },
        Commands::List {
            branch,
            limit,
            offset,
        } => print_json(&store.list_versions(branch.as_deref(), limit, offset).await?),
        Commands::Diff { from, to } => print_json(&store.compare_versions(&from, &to).await?),
        Commands::Rollback {
            version_id,
            reason,
            author,
            keep_head,
        } => {
            let options = RollbackOptions {
                branch: None,
                created_by: author.unwrap_or_else(|| "system".to_string()),
                reason,
                update_branch_head: !keep_head,
            };
            print_json(&store.rollback_to_version(&version_id, options).await?)
        }
        Commands::Branch {
            name,
            from,
            author,
            description,
        } => {
            let created_by = author.unwrap_or_else(|| "system".to_string());
            print_json(
                &store
                    .create_branch(&name, &from, &created_by, &description)
                    .await?,
            )
        }
        Commands::Branches => print_json(&store.list_branches().await?),
        Commands::Cleanup { max } => {
            let max = max.unwrap_or(store.config().max_versions_per_branch);
            print_json(&store.cleanup_old_versions(max).await?)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
