//! keeld: the Keel control-plane daemon.
//!
//! Opens the redb state store, wires the service context, and runs the
//! instance tracker until interrupted. The read subcommands inspect the
//! same store offline.
//!
//! # Usage
//!
//! ```text
//! keeld serve --config /etc/keel/keel.toml --data-dir /var/lib/keel
//! keeld instances --data-dir /var/lib/keel
//! keeld versions myapp --data-dir /var/lib/keel
//! ```

mod serve;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use keel_core::{ImageNaming, KeelConfig};
use keel_state::{ServiceContext, StateStore};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,keeld=debug,keel=debug";

#[derive(Parser)]
#[command(name = "keeld", about = "Keel control-plane daemon")]
struct Cli {
    /// Log as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone)]
struct CommonArgs {
    /// Path to keel.toml. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory for persistent state.
    #[arg(long, default_value = "/var/lib/keel")]
    data_dir: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Run the instance tracker until interrupted.
    Serve(CommonArgs),

    /// Print the live control-plane replicas as JSON.
    Instances(CommonArgs),

    /// Print the version aggregate of an app as JSON.
    Versions {
        app: String,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Serve(args) => {
            let config = load_config(args.config.as_deref())?;
            let ctx = open_context(&args.data_dir)?;
            serve::run(config, ctx).await
        }
        Command::Instances(args) => {
            let config = load_config(args.config.as_deref())?;
            let ctx = open_context(&args.data_dir)?;
            let live = ctx.instances.list_live(config.tracker.stale_timeout())?;
            println!("{}", serde_json::to_string_pretty(&live)?);
            Ok(())
        }
        Command::Versions { app, common } => {
            let config = load_config(common.config.as_deref())?;
            let ctx = open_context(&common.data_dir)?;
            let registry =
                keel_version::VersionRegistry::from_context(&ctx, ImageNaming::from_config(&config.docker));
            let versions = registry
                .app_versions(&app)
                .with_context(|| format!("reading versions of {app}"))?;
            println!("{}", serde_json::to_string_pretty(&versions)?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<KeelConfig> {
    match path {
        Some(path) => KeelConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(KeelConfig::default()),
    }
}

fn open_context(data_dir: &Path) -> anyhow::Result<ServiceContext> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;
    let db_path = data_dir.join("keel.redb");
    let store = StateStore::open(&db_path)?;
    tracing::info!(path = ?db_path, "state store opened");
    Ok(ServiceContext::from_store(store))
}
