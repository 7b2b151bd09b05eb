//! StrataKV CLI
//!
//! Local administration of a StrataKV database directory.

use std::process;

use clap::{Parser, Subcommand};
use stratakv::{destroy_database, repair_database, Engine, Options, ReadOptions, WriteOptions};
use tracing_subscriber::{fmt, EnvFilter};

/// StrataKV CLI
#[derive(Parser, Debug)]
#[command(name = "stratakv-cli")]
#[command(about = "Inspect and modify a StrataKV database")]
#[command(version)]
struct Args {
    /// Database directory
    #[arg(short, long, default_value = "./stratakv_data")]
    db: String,

    /// Create the database if it does not exist
    #[arg(long)]
    create: bool,

    /// Treat any detected corruption as fatal
    #[arg(long)]
    paranoid: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,

        /// fsync the log before returning
        #[arg(long)]
        sync: bool,
    },

    /// Delete a key
    Delete {
        /// The key to delete
        key: String,
    },

    /// Print keys in order
    Scan {
        /// First key to print
        #[arg(long)]
        start: Option<String>,

        /// Maximum number of entries
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print level statistics
    Stats,

    /// Compact the whole key space
    Compact,

    /// Rebuild the manifest from logs and tables
    Repair,

    /// Delete the database
    Destroy,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,stratakv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let options = Options::builder()
        .create_if_missing(args.create)
        .paranoid_checks(args.paranoid)
        .build();

    if let Err(e) = run(&args, options) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(args: &Args, options: Options) -> stratakv::Result<()> {
    match &args.command {
        Commands::Repair => {
            let stats = repair_database(&args.db, &options)?;
            println!(
                "recovered {} tables ({} dropped) from {} logs, last sequence {}",
                stats.tables_recovered, stats.tables_dropped, stats.logs_converted, stats.last_sequence
            );
            return Ok(());
        }
        Commands::Destroy => return destroy_database(&args.db, &options),
        _ => {}
    }

    let engine = Engine::open(&args.db, options)?;
    match &args.command {
        Commands::Get { key } => match engine.get(key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        },
        Commands::Put { key, value, sync } => {
            let write_options = WriteOptions { sync: *sync };
            engine.put_with(&write_options, key.as_bytes(), value.as_bytes())?;
            println!("OK");
        }
        Commands::Delete { key } => {
            engine.delete(key.as_bytes())?;
            println!("OK");
        }
        Commands::Scan { start, limit } => {
            let mut iter = engine.iter(&ReadOptions::default());
            match start {
                Some(start) => iter.seek(start.as_bytes()),
                None => iter.seek_to_first(),
            }
            let mut printed = 0;
            while iter.valid() && limit.map_or(true, |limit| printed < limit) {
                println!(
                    "{} => {}",
                    String::from_utf8_lossy(iter.key()),
                    String::from_utf8_lossy(iter.value())
                );
                printed += 1;
                iter.next();
            }
            iter.status()?;
        }
        Commands::Stats => {
            if let Some(stats) = engine.property("leveldb.stats") {
                print!("{}", stats);
            }
            if let Some(tables) = engine.property("leveldb.sstables") {
                print!("{}", tables);
            }
        }
        Commands::Compact => {
            engine.compact_range(None, None)?;
            println!("OK");
        }
        Commands::Repair | Commands::Destroy => {}
    }
    engine.close()
}
