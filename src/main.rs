use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ordkv::{Error, Store, DEFAULT_DATA_SIZE, DEFAULT_KEY_SIZE, DEFAULT_NUM_KEYS};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "ordkv", version = VERSION, about = "A single-file ordered key-value store.")]
struct Cli {
    /// Path to the store file.
    path: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Creates a new, empty store file.
    Create {
        #[arg(long, default_value_t = DEFAULT_NUM_KEYS)]
        num_keys: usize,
        #[arg(long, default_value_t = DEFAULT_KEY_SIZE)]
        key_size: usize,
        #[arg(long, default_value_t = DEFAULT_DATA_SIZE)]
        data_size: usize,
    },
    /// Inserts or updates a key.
    Put { key: String, value: String },
    /// Looks up a key.
    Get { key: String },
    /// Deletes a key.
    Delete { key: String },
    /// Reports whether a key is present.
    Contains { key: String },
    /// Prints the number of keys stored.
    Len,
    /// Prints every entry in ascending key order.
    Iter,
    /// Prints every entry in descending key order.
    IterRev,
    /// Prints the lifetime counters.
    Stats,
    /// Runs the whole-tree consistency checker.
    Check,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    if let Command::Create { num_keys, key_size, data_size } = cli.command {
        Store::create(&cli.path, num_keys, key_size, data_size)?;
        return Ok(());
    }

    let mut store = Store::open(&cli.path)?;
    match cli.command {
        Command::Create { .. } => unreachable!("handled above"),
        Command::Put { key, value } => store.put(key.as_bytes(), value.as_bytes())?,
        Command::Get { key } => {
            let value = store.get(key.as_bytes())?;
            println!("{}", String::from_utf8_lossy(&value));
        }
        Command::Delete { key } => store.delete(key.as_bytes())?,
        Command::Contains { key } => println!("{}", store.contains(key.as_bytes())?),
        Command::Len => println!("{}", store.len()?),
        Command::Iter => print_entries(store.iter()?)?,
        Command::IterRev => print_entries(store.iter_reverse()?)?,
        Command::Stats => println!("{:#?}", store.stats()?),
        Command::Check => println!("{}", store.check_consistency()?),
    }
    Ok(())
}

fn print_entries(entries: impl Iterator<Item = Result<(Vec<u8>, Vec<u8>), Error>>) -> Result<(), Error> {
    for entry in entries {
        let (key, value) = entry?;
        println!("{}\t{}", String::from_utf8_lossy(&key), String::from_utf8_lossy(&value));
    }
    Ok(())
}
