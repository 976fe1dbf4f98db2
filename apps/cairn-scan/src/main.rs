use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use cairn_car::{read_raw, Indexer};

/// `cairn-scan` lists the roots and block index of a CAR file
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the CAR file to scan
    car: PathBuf,

    /// Read each payload back and report its length (verifies the index
    /// against the file)
    #[arg(short, long)]
    blocks: bool,

    /// Scan buffer size in bytes
    #[arg(long, default_value_t = cairn_car::DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    setup_logging();

    let mut indexer = Indexer::open_with_buffer_size(&args.car, args.buffer_size)
        .await
        .with_context(|| format!("failed to open {}", args.car.display()))?;

    for root in indexer.roots() {
        println!("root\t{root}");
    }

    let mut file = if args.blocks {
        Some(tokio::fs::File::open(&args.car).await?)
    } else {
        None
    };

    let mut count = 0u64;
    let mut payload_bytes = 0u64;
    while let Some(entry) = indexer.next().await? {
        match &mut file {
            Some(file) => {
                let payload = read_raw(file, &entry).await?;
                println!(
                    "block\t{}\toffset={}\tlength={}",
                    entry.key,
                    entry.block_offset,
                    payload.len()
                );
            }
            None => {
                println!(
                    "block\t{}\toffset={}\tlength={}",
                    entry.key, entry.block_offset, entry.block_length
                );
            }
        }
        count += 1;
        payload_bytes += entry.block_length;
    }

    info!(blocks = count, payload_bytes, "scan finished");
    Ok(())
}

fn setup_logging() {
    use tracing_subscriber::FmtSubscriber;

    const DEFAULT_LOGGING: &str = "cairn_scan=info,warn";

    let rust_log = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| if s.is_empty() { None } else { Some(s) })
        .unwrap_or_else(|| DEFAULT_LOGGING.to_owned());

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder().with_env_filter(rust_log).finish(),
    )
    .expect("tracing setup failed");
}
