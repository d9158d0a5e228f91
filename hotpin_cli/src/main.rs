use crate::init_config::CmdConfig;
use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use clap_verbosity_flag::InfoLevel;
use directories::ProjectDirs;
use std::path::PathBuf;

mod cmd;
mod helpers;
mod init_config;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// which hotpin node config this command should use
    #[arg(short, long, value_name = "NAME", default_value = "local")]
    node: String,

    /// Explicit config file path; overrides --node
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Act as this tenant instead of the one in the config
    #[arg(short, long, value_name = "TENANT", global = true)]
    tenant: Option<String>,

    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity<InfoLevel>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Modify the hotpin node's config
    Config {
        #[command(subcommand)]
        cmd: CmdConfig,
    },
    /// Upload a file and hold it provisionally (staged)
    Stage {
        /// Local file to upload
        path: PathBuf,
    },
    /// Durably pin content for the tenant
    Pin {
        /// Content id (multibase)
        cid: String,
    },
    /// Release the tenant's pin; the node unpins once nobody holds it
    Unpin {
        /// Content id (multibase)
        cid: String,
    },
    /// Move the tenant's pin from one content id to another
    Replace {
        /// Content id currently pinned
        from: String,
        /// Content id to pin instead
        to: String,
    },
    /// Download content from the storage node into a local file
    Get {
        /// Content id (multibase)
        cid: String,
        /// Output file path
        #[arg(long)]
        out: PathBuf,
    },
    /// Show reference counts and pin records for a content id
    Status {
        /// Content id (multibase)
        cid: String,
    },
    /// List the tenant's pins
    Ls {
        /// List every tracked content id of every tenant
        #[arg(long, action = ArgAction::SetTrue)]
        all: bool,
    },
    /// Unpin content that is only staged and older than the grace period
    GcStaged {
        /// Content ids to keep regardless of their state (repeatable)
        #[arg(long, value_name = "CID")]
        exclude: Vec<String>,
        /// If set, only print which content ids would be unpinned.
        #[arg(long, action = ArgAction::SetTrue)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(std::io::stderr)
        .init();

    // Configs live under ~/.config/hotpin/<name>.toml, data under
    // ~/.local/share/hotpin/<name>/.
    let dirs = ProjectDirs::from("", "", "hotpin")
        .context("failed to determine config directory path")?;

    let node_config_file = match &cli.config {
        Some(path) => path.clone(),
        None => dirs.config_dir().join(&cli.node).with_extension("toml"),
    };
    let local_data_dir = dirs.data_dir().join(&cli.node);

    cmd::run_command(node_config_file, &local_data_dir, cli.tenant, cli.cmd).await
}
