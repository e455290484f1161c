//! blobsync command-line client
//!
//! Inspects and edits a sync target stored in a local directory.
//!
//! Usage:
//!   blobsync --target ./sync init
//!   blobsync --target ./sync create --title "Groceries" --body "milk"
//!   blobsync --target ./sync delta --limit 20

use anyhow::{Context, Result};
use blobsync_cli::{load_or_generate_client_id, CliConfig};
use blobsync_drivers::LocalDriver;
use blobsync_sync::{
    GetItemOptions, GetItemOutput, GetItemsMetadataOptions, Synchronizer, SYNC_TARGET_VERSION,
};
use blobsync_types::Item;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "blobsync")]
#[command(about = "Inspect and edit a blobsync sync target")]
struct Args {
    /// Directory holding the sync target
    #[arg(short, long)]
    target: PathBuf,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// File storing this client's id
    #[arg(long, default_value = "blobsync-client.id")]
    client_id_file: PathBuf,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialise an empty target
    Init,
    /// Print the sync info of the target
    Info,
    /// List the locks on the target
    Locks,
    /// List items changed since a timestamp
    Delta {
        /// Unix milliseconds to start from
        #[arg(long, default_value = "0")]
        since: i64,
        #[arg(long, default_value = "50")]
        limit: usize,
    },
    /// Print an item
    Get {
        id: String,
        /// Print the remote file instead of the parsed item
        #[arg(long)]
        raw: bool,
    },
    /// Create a note, or a resource when --file is given
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        body: String,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Delete items
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let client_id = load_or_generate_client_id(&args.client_id_file)?;
    let config = CliConfig::load(args.config.as_deref())?.into_synchronizer_config(client_id);
    std::fs::create_dir_all(&args.target)
        .with_context(|| format!("Failed to create target directory {}", args.target.display()))?;
    let sync = Synchronizer::new(Arc::new(LocalDriver::new(&args.target)), config);

    match args.command {
        Command::Init => {
            sync.migration_handler().init_sync_info(SYNC_TARGET_VERSION).await?;
            info!("Initialised {}", args.target.display());
        }
        Command::Info => {
            let info = sync.migration_handler().fetch_sync_target_info().await?;
            print_json(&info.filtered())?;
        }
        Command::Locks => {
            print_json(&sync.lock_handler().locks(None).await?)?;
        }
        Command::Delta { since, limit } => {
            let page = sync
                .get_items_metadata(GetItemsMetadataOptions {
                    context: Some(blobsync_types::DeltaContext::since(since)),
                    output_limit: limit,
                    ..GetItemsMetadataOptions::default()
                })
                .await?;
            print_json(&page.items)?;
        }
        Command::Get { id, raw } => {
            let options = GetItemOptions {
                unserialize: !raw,
                ..GetItemOptions::by_id(id.as_str())
            };
            match sync.get_item(options).await? {
                Some(GetItemOutput::Raw(content)) => println!("{}", String::from_utf8_lossy(&content)),
                Some(GetItemOutput::Item(item)) => print_json(&item)?,
                None => anyhow::bail!("Item not found: {id}"),
            }
        }
        Command::Create { title, body, file } => {
            let item = match file {
                Some(path) => Item::resource("", &title, path),
                None => Item::note("", &title, &body),
            };
            let output = sync.create_items(vec![item]).await?;
            for failed in &output.failed_items {
                tracing::error!("Could not create item: {}", failed.error);
            }
            print_json(&output.created_items)?;
        }
        Command::Delete { ids } => {
            for result in sync.delete_items(ids).await? {
                println!("{}\t{}", result.item.id, result.status.message());
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
