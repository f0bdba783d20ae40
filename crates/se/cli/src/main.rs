use clap::{Parser, Subcommand};
use nexum_se::SeConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

mod commands;
mod utils;

use commands::*;
use utils::reader;

#[derive(Parser)]
#[command(version, about = "Inspect secure elements and exchange APDUs over logical channels")]
struct Cli {
    /// Optional reader name to use (will auto-detect if not specified)
    #[arg(short, long, global = true)]
    reader: Option<String>,

    /// Use an in-memory card with an echo applet instead of PC/SC
    #[arg(long = "virtual", global = true)]
    virtual_card: bool,

    /// Maximum number of logical channels open at once
    #[arg(long, global = true, default_value_t = 19)]
    max_channels: u8,

    /// Trace level output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available readers
    List,

    /// Print the ATR of the card in the reader
    Atr,

    /// Open a channel and send APDUs on it
    Transmit {
        /// AID to select, as a hex string
        #[arg(long)]
        aid: Option<String>,

        /// Use the basic channel instead of a logical one
        #[arg(long)]
        basic: bool,

        /// Command APDUs, as hex strings
        #[arg(required = true)]
        apdus: Vec<String>,
    },

    /// Interactive channel shell reading commands from stdin
    Shell,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = SeConfig::new().with_max_logical_channels(cli.max_channels);
    let service = reader::open_service(cli.virtual_card, config)?;

    if let Commands::List = cli.command {
        return list_command(&service);
    }

    let reader = match &cli.reader {
        Some(name) => reader::find_reader_by_name(&service, name)?,
        None => reader::find_reader_with_card(&service)?,
    };
    info!("Using reader: {}", service.reader_name(reader)?);

    match &cli.command {
        Commands::List => unreachable!(), // Already handled above
        Commands::Atr => atr_command(&service, reader)?,
        Commands::Transmit { aid, basic, apdus } => {
            transmit_command(&service, reader, aid.as_deref(), *basic, apdus)?
        }
        Commands::Shell => shell_command(&service, reader)?,
    }

    service.close()?;
    Ok(())
}

fn setup_logging(verbose: bool) {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose, &directives))
        .with_ansi(true)
        .init();
}

/// `RUST_LOG` directives win over the verbosity flag
fn log_filter(verbose: bool, directives: &str) -> EnvFilter {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    EnvFilter::builder()
        .with_default_directive(level.into())
        .parse_lossy(directives)
}
