//! vfscache CLI
//!
//! Inspection tool for vfscache data directories.

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use vfscache::config::{LogConfig, DEFAULT_PAGE_SIZE};
use vfscache::{AppendLog, CacheEngine, Config, RecoveryPolicy, Result};

/// vfscache CLI
#[derive(Parser, Debug)]
#[command(name = "vfscache-cli")]
#[command(about = "Inspect and edit vfscache storages")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./vfscache_data")]
    data_dir: PathBuf,

    /// Page size the storages were created with
    #[arg(short, long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Open storages that were not closed properly (recovering them)
    #[arg(long)]
    recover: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Append-only log tools
    Log {
        #[command(subcommand)]
        command: LogCommands,
    },

    /// Content store tools
    Content {
        #[command(subcommand)]
        command: ContentCommands,
    },

    /// Print record counts for every storage
    Stats,
}

#[derive(Subcommand, Debug)]
enum LogCommands {
    /// List the records of a log file
    Dump {
        /// Path of the log file
        path: PathBuf,

        /// Stop after this many records
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
enum ContentCommands {
    /// Store a file's bytes; prints the content id
    Put {
        /// File to store
        file: PathBuf,
    },

    /// Write the content of a record to stdout or a file
    Get {
        /// Content id
        id: u32,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Verify a record (or every record)
    Check {
        /// Content id; all records if omitted
        id: Option<u32>,

        /// Structural check only, skip decompression and rehash
        #[arg(long)]
        fast: bool,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,vfscache=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let recovery = if args.recover {
        RecoveryPolicy::Recover
    } else {
        RecoveryPolicy::Fail
    };

    match args.command {
        Commands::Log { command } => match command {
            LogCommands::Dump { path, limit } => {
                let config = LogConfig::with_page_size(args.page_size).recovery(recovery);
                dump_log(path, config, limit)
            }
        },
        Commands::Content { command } => {
            let engine = open_engine(&args.data_dir, args.page_size, recovery)?;
            let result = run_content(&engine, command);
            engine.close()?;
            result
        }
        Commands::Stats => {
            let engine = open_engine(&args.data_dir, args.page_size, recovery)?;
            print_stats(&engine);
            engine.close()
        }
    }
}

fn open_engine(data_dir: &PathBuf, page_size: usize, recovery: RecoveryPolicy) -> Result<CacheEngine> {
    let config = Config::builder()
        .data_dir(data_dir)
        .page_size(page_size)
        .recovery(recovery)
        .build();
    CacheEngine::open(config)
}

fn dump_log(path: PathBuf, config: LogConfig, limit: Option<usize>) -> Result<()> {
    let log = AppendLog::open(&path, config)?;
    if let Some(report) = log.recovery_report() {
        println!("recovered: {:?}", report);
    }
    println!(
        "{}: {} records, data version {}",
        path.display(),
        log.records_count(),
        log.data_version()
    );

    let limit = limit.unwrap_or(usize::MAX);
    let mut shown = 0;
    log.for_each_record(|id, payload| {
        println!("{:>10}  {:>8} bytes  {}", id, payload.len(), preview(payload));
        shown += 1;
        shown < limit
    })?;

    log.close()
}

fn run_content(engine: &CacheEngine, command: ContentCommands) -> Result<()> {
    let contents = engine.contents();
    match command {
        ContentCommands::Put { file } => {
            let bytes = fs::read(&file)?;
            let id = contents.store_record(&bytes)?;
            println!("{}", id);
        }
        ContentCommands::Get { id, out } => {
            let bytes = contents.read_stream(id)?;
            match out {
                Some(path) => fs::write(path, &bytes)?,
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(&bytes)?;
                }
            }
        }
        ContentCommands::Check { id: Some(id), fast } => {
            contents.check_record(id, fast)?;
            println!("{}: ok ({})", id, contents.content_hash(id)?);
        }
        ContentCommands::Check { id: None, fast } => {
            let mut ids = Vec::new();
            contents.storage().for_each_record(|id, _| {
                ids.push(id as u32);
                true
            })?;

            let mut failed = 0;
            for id in &ids {
                if let Err(e) = contents.check_record(*id, fast) {
                    println!("{}: {}", id, e);
                    failed += 1;
                }
            }
            println!("checked {} records, {} failed", ids.len(), failed);
        }
    }
    Ok(())
}

fn print_stats(engine: &CacheEngine) {
    let contents = engine.contents();
    println!("data dir:   {}", engine.data_dir().display());
    println!(
        "contents:   {} records, {} index entries",
        contents.records_count(),
        contents.index_len()
    );
    println!("names:      {} values", engine.names().records_count());

    let stats = engine.attributes().stats();
    println!(
        "attributes: {} live, {} allocated, {} relocated, {} deleted, {} payload / {} capacity bytes",
        stats.live_records(),
        stats.records_allocated,
        stats.records_relocated,
        stats.records_deleted,
        stats.live_payload_bytes,
        stats.live_capacity_bytes
    );
}

fn preview(payload: &[u8]) -> String {
    const PREVIEW_LEN: usize = 32;
    let shown = &payload[..payload.len().min(PREVIEW_LEN)];
    let text: String = shown
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
        .collect();
    if payload.len() > PREVIEW_LEN {
        format!("{}...", text)
    } else {
        text
    }
}
