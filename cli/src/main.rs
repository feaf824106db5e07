//! chainsearch CLI — inspect and manage event-indexing state.
//!
//! Usage:
//! ```bash
//! chainsearch progress /tmp event_indexing
//! chainsearch clear    /tmp event_indexing
//! chainsearch classify 0x5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060
//! chainsearch config   ./processor.json
//! chainsearch info
//! ```

mod logging;

use std::env;
use std::process;

use anyhow::{bail, Context, Result};

use chainsearch_core::checkpoint::ProgressStore;
use chainsearch_core::config::ProcessorConfig;
use chainsearch_core::query::infer_search_type;
use chainsearch_core::search::DEFAULT_DOCUMENT_BATCH_SIZE;
use chainsearch_storage::JsonFileProgressStore;

use logging::{init_tracing, LogConfig};

#[tokio::main]
async fn main() {
    init_tracing(&LogConfig::from_env());

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "progress" => cmd_progress(&args[2..]).await,
        "clear" => cmd_clear(&args[2..]).await,
        "classify" => cmd_classify(&args[2..]),
        "config" => cmd_config(&args[2..]),
        "info" => {
            cmd_info();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            println!("chainsearch {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("chainsearch {}", env!("CARGO_PKG_VERSION"));
    println!("Checkpointed blockchain event search indexing\n");
    println!("USAGE:");
    println!("    chainsearch <COMMAND> [ARGS]\n");
    println!("COMMANDS:");
    println!("    progress <dir> <stream>  Show the stored checkpoint of a progress stream");
    println!("    clear <dir> <stream>     Delete the stored checkpoint of a progress stream");
    println!("    classify <query>         Classify a search query (block, transaction, address)");
    println!("    config <file>            Validate and print a processor config file");
    println!("    info                     Show ChainSearch configuration info");
    println!("    version                  Print version");
    println!("    help                     Print this help");
    println!("\nENVIRONMENT:");
    println!("    RUST_LOG, CHAINSEARCH_LOG, CHAINSEARCH_LOG_JSON");
}

/// `<dir> <stream>` arguments, defaulting to the temp dir and the default stream.
fn store_args(args: &[String]) -> (JsonFileProgressStore, String) {
    let store = match args.first() {
        Some(dir) => JsonFileProgressStore::new(dir),
        None => JsonFileProgressStore::in_temp_dir(),
    };
    let stream = args
        .get(1)
        .cloned()
        .unwrap_or_else(|| ProcessorConfig::default().stream_id);
    (store, stream)
}

async fn cmd_progress(args: &[String]) -> Result<()> {
    let (store, stream) = store_args(args);
    let path = store.path_for(&stream);
    match store.load(&stream).await? {
        Some(cp) => {
            let saved = chrono::DateTime::from_timestamp(cp.updated_at, 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| cp.updated_at.to_string());
            println!("stream:               {}", cp.stream_id);
            println!("last block processed: {}", cp.last_block_processed);
            println!("next block:           {}", cp.last_block_processed.saturating_add(1));
            println!("saved at:             {saved}");
            println!("file:                 {}", path.display());
        }
        None => println!("No progress stored for {stream} ({})", path.display()),
    }
    Ok(())
}

async fn cmd_clear(args: &[String]) -> Result<()> {
    let (store, stream) = store_args(args);
    store.delete(&stream).await?;
    println!("Cleared progress for {stream}");
    Ok(())
}

fn cmd_classify(args: &[String]) -> Result<()> {
    if args.is_empty() {
        bail!("classify needs a query");
    }
    let query = args.join(" ");
    println!("{}", infer_search_type(&query));
    Ok(())
}

fn cmd_config(args: &[String]) -> Result<()> {
    let Some(path) = args.first() else {
        bail!("config needs a file path");
    };
    let config = ProcessorConfig::from_json_file(path)
        .with_context(|| format!("loading {path}"))?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_info() {
    let defaults = ProcessorConfig::default();
    println!("ChainSearch v{}", env!("CARGO_PKG_VERSION"));
    println!("  Default progress stream: {}", defaults.stream_id);
    println!("  Default blocks per batch: {}", defaults.max_blocks_per_batch);
    println!("  Default minimum confirmations: {}", defaults.minimum_confirmations);
    println!("  Default poll interval: {} ms", defaults.poll_interval_ms);
    println!("  Default document batch size: {DEFAULT_DOCUMENT_BATCH_SIZE}");
    println!("  Progress store: JSON file in {}", env::temp_dir().display());
    println!("  Storage backends: memory, SQLite (feature: sqlite)");
    println!("  Chains: EVM JSON-RPC");
}
