//! chunkstore CLI
//!
//! Command-line access to a store directory.

use std::io::{self, Write};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use chunkstore::{
    Config, DoubleBufferedStore, Key, MaintenanceBudget, SingleFileStore, Storage, StoreError,
};
use tracing_subscriber::{fmt, EnvFilter};

/// chunkstore CLI
#[derive(Parser, Debug)]
#[command(name = "chunkstore-cli")]
#[command(about = "Inspect and modify a chunkstore directory")]
#[command(version)]
struct Args {
    /// Store directory
    #[arg(short, long, default_value = "./chunkstore_data")]
    dir: String,

    /// Base name of the store files
    #[arg(short, long, default_value = "storage")]
    name: String,

    /// Storage backend
    #[arg(short, long, value_enum, default_value_t = Backend::Double)]
    backend: Backend,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    /// Double-buffered chunk store
    Double,
    /// One file per key
    Single,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key (keys look like `1.2/3`)
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
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Run a forced defragmentation pass
    Defrag,

    /// Print a store summary
    Stats,

    /// Print every key and its chunk
    Dump,
}

impl Commands {
    fn needs_write(&self) -> bool {
        matches!(
            self,
            Commands::Put { .. } | Commands::Del { .. } | Commands::Defrag
        )
    }
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chunkstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> chunkstore::Result<()> {
    tracing::debug!("chunkstore v{}", chunkstore::VERSION);

    let store: Box<dyn Storage> = match args.backend {
        Backend::Double => {
            let config = Config::builder()
                .data_dir(&args.dir)
                .base_name(&args.name)
                .build();
            Box::new(DoubleBufferedStore::new(config)?)
        }
        Backend::Single => Box::new(SingleFileStore::new(&args.dir)),
    };

    if !store.open(args.command.needs_write())? {
        return Err(StoreError::Config(format!("no store found in {}", args.dir)));
    }

    let result = execute(store.as_ref(), &args.command);
    let closed = store.close();
    result.and(closed)
}

fn execute(store: &dyn Storage, command: &Commands) -> chunkstore::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match command {
        Commands::Get { key } => match store.read(&parse_key(key)?)? {
            Some(value) => {
                out.write_all(&value)?;
                writeln!(out)?;
            }
            None => writeln!(out, "(nil)")?,
        },
        Commands::Put { key, value } => {
            store.write(&parse_key(key)?, value.as_bytes())?;
            writeln!(out, "OK")?;
        }
        Commands::Del { key } => {
            store.remove(&parse_key(key)?)?;
            writeln!(out, "OK")?;
        }
        Commands::Defrag => {
            store.maintenance(MaintenanceBudget::Forced)?;
            store.dump_summary(&mut out)?;
        }
        Commands::Stats => store.dump_summary(&mut out)?,
        Commands::Dump => store.dump(&mut out)?,
    }
    Ok(())
}

fn parse_key(text: &str) -> chunkstore::Result<Key> {
    Key::parse(text).ok_or_else(|| {
        StoreError::InvalidArgument(format!(
            "invalid key {:?}, expected components like 1.2/3",
            text
        ))
    })
}
