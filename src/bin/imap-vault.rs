#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for incremental IMAP backup and restore

use clap::{Parser, Subcommand};
use imap_vault::{
    BackupEngine, ImapConfig, ImapMailbox, IndexFiles, MailboxAccess, MaintenanceEngine,
    RestoreEngine, SyncConfig, SyncIndex,
};
use serde::Serialize;
use std::fmt::Display;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "imap-vault")]
#[command(about = "Incremental, content-addressed IMAP mailbox backup and restore")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Backup directory (default: $BACKUP_DIR)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log filter, e.g. `info` or `imap_vault=debug` (default: $RUST_LOG)
    #[arg(long, global = true)]
    log: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch new messages and folder memberships into the store
    Backup,

    /// Upload missing messages and recreate folder memberships
    Restore,

    /// Purge unreferenced payloads and re-key changed ones
    Compact {
        /// Report what would change without changing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the message and folder index as JSON
    PrintIndex,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = args
        .log
        .as_deref()
        .map_or_else(EnvFilter::from_default_env, EnvFilter::new);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut sync = match &args.dir {
        Some(dir) => SyncConfig::new(dir),
        None => SyncConfig::from_env()?,
    };

    match &args.command {
        Command::Backup => {
            let mut mailbox = connect().await?;
            let result = BackupEngine::new(sync).run(&mut mailbox).await;
            mailbox.logout().await.ok();
            let (_, report) = result?;
            emit(&args, &report)?;
        }
        Command::Restore => {
            let engine = RestoreEngine::new(sync);
            let mut mailbox = connect().await?;
            let result = engine.run(&mut mailbox).await;
            mailbox.logout().await.ok();
            let (_, report) = result?;
            emit(&args, &report)?;
        }
        Command::Compact { dry_run } => {
            sync.dry_run = *dry_run;
            let (_, report) = MaintenanceEngine::new(sync).compact()?;
            emit(&args, &report)?;
        }
        Command::PrintIndex => {
            let files = IndexFiles::in_dir(sync.store_dir(), sync.backlog_depth);
            let index = SyncIndex::load(&files);
            let dump = serde_json::json!({
                "messages": index.messages,
                "folders": index.folders,
            });
            println!("{}", serde_json::to_string_pretty(&dump)?);
        }
    }

    Ok(())
}

async fn connect() -> anyhow::Result<ImapMailbox> {
    let config = ImapConfig::from_env()?;
    Ok(ImapMailbox::connect(&config).await?)
}

fn emit<T: Serialize + Display>(args: &Args, report: &T) -> anyhow::Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}
