//! atlasdown CLI
//!
//! Command-line access to a store on local disk.

use std::process::ExitCode;

use atlasdown::{Config, Database, GetOptions, IteratorOptions, WriteOptions};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "atlasdown-cli")]
#[command(about = "Inspect and maintain an atlasdown store")]
#[command(version)]
struct Args {
    /// Store directory
    #[arg(short, long, default_value = "./atlasdown_data")]
    location: String,

    /// Fail instead of creating a missing store
    #[arg(long)]
    no_create: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get { key: String },

    /// Set a key-value pair
    Put {
        key: String,
        value: String,

        /// fsync the log before returning
        #[arg(long)]
        sync: bool,
    },

    /// Delete a key
    Del { key: String },

    /// Print entries in key order
    Scan {
        /// Inclusive start key
        #[arg(long)]
        start: Option<String>,

        /// Inclusive end key
        #[arg(long)]
        end: Option<String>,

        #[arg(long)]
        reverse: bool,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print an engine property (e.g. atlaskv.stats)
    Property { name: String },

    /// Remove every store file at the location
    Destroy,

    /// Rebuild the store from its tables and log
    Repair,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,atlasdown=debug"));
    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(kind = %e.kind(), "{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> atlasdown::Result<()> {
    match args.command {
        Commands::Destroy => return atlasdown::destroy(&args.location),
        Commands::Repair => {
            let report = atlasdown::repair(&args.location)?;
            println!("{:#?}", report);
            return Ok(());
        }
        _ => {}
    }

    let db = Database::new(&args.location)?;
    db.open(Config::builder().create_if_missing(!args.no_create).build())?;

    let result = execute(&db, args.command);
    let closed = db.close();
    result.and(closed)
}

fn execute(db: &Database, command: Commands) -> atlasdown::Result<()> {
    match command {
        Commands::Get { key } => {
            println!("{}", db.get(key, GetOptions::default())?);
        }
        Commands::Put { key, value, sync } => {
            db.put(key, value, WriteOptions { sync })?;
        }
        Commands::Del { key } => {
            db.del(key, WriteOptions::default())?;
        }
        Commands::Scan {
            start,
            end,
            reverse,
            limit,
        } => {
            let cursor = db.iterator(IteratorOptions {
                start: start.map(String::into_bytes),
                end: end.map(String::into_bytes),
                reverse,
                limit,
                key_as_buffer: false,
                value_as_buffer: false,
                ..IteratorOptions::default()
            })?;
            while let Some((key, value)) = cursor.next()? {
                println!("{}\t{}", key, value);
            }
            cursor.end()?;
        }
        Commands::Property { name } => {
            println!("{}", db.get_property(&name)?);
        }
        Commands::Destroy | Commands::Repair => {}
    }
    Ok(())
}
