use clap::{Parser, Subcommand};
use dirpack::archive::{self, ExtractOptions, PackOptions};
use dirpack::PackError;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// 1 GiB per chunk.
const MAX_CHUNK_KIB: i64 = 1 << 20;

#[derive(Parser)]
#[command(name = "dirpack", about = "Pack directories into PACK containers and obfuscate files")]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
    /// I/O chunk size in KiB (1 to 1048576)
    #[arg(
        long, default_value_t = 64, global = true,
        value_parser = clap::value_parser!(u32).range(1..=MAX_CHUNK_KIB),
    )]
    chunk_size: u32,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a directory into a .pack archive
    Pack {
        input: PathBuf,
        /// Defaults to INPUT.pack
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Extract a .pack archive into a directory
    Extract {
        input: PathBuf,
        /// Defaults to INPUT without its extension
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Obfuscate a file with the byte-negation transform
    Encrypt {
        input: PathBuf,
        /// Defaults to INPUT.enc
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Reverse `encrypt` (the transform is its own inverse)
    Decrypt {
        input: PathBuf,
        /// Defaults to INPUT without .enc
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List archive contents in data order
    List {
        input: PathBuf,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show archive metadata
    Info {
        input: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), PackError> {
    let chunk_size = cli.chunk_size as usize * 1024;

    match cli.command {

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { input, output } => {
            let output = output.unwrap_or_else(|| archive::default_pack_output(&input));
            let bytes = archive::pack(&input, &output, &PackOptions { chunk_size })?;
            println!("Created: {} ({} bytes)", output.display(), bytes);
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { input, output } => {
            let output = output.unwrap_or_else(|| archive::default_extract_output(&input));
            let summary = archive::extract(&input, &output, &ExtractOptions { chunk_size })?;
            println!("Extracted {} file(s) to: {}", summary.files, output.display());
        }

        // ── Encrypt / Decrypt ────────────────────────────────────────────────
        Commands::Encrypt { input, output } => {
            let output = output.unwrap_or_else(|| archive::default_encrypt_output(&input));
            archive::encrypt(&input, &output, chunk_size)?;
            println!("Encrypted: {}", output.display());
        }
        Commands::Decrypt { input, output } => {
            let output = output.unwrap_or_else(|| archive::default_decrypt_output(&input));
            archive::decrypt(&input, &output, chunk_size)?;
            println!("Decrypted: {}", output.display());
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, json } => {
            let listing = archive::list(&input)?;
            if json {
                let text = serde_json::to_string_pretty(&listing)
                    .map_err(|e| PackError::Io(e.into()))?;
                println!("{text}");
            } else {
                println!("Archive: {}", input.display());
                println!("{:>12} {:>12}  Path", "Offset", "Size");
                for f in &listing.files {
                    println!("{:>12} {:>12}  {}", f.offset, f.size, f.path.display());
                }
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let info = archive::info(&input)?;
            println!("── PACK Archive ─────────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Magic          {}", String::from_utf8_lossy(dirpack::MAGIC));
            println!("  Data base      {} B", info.data_base);
            println!("  Directories    {}", info.directories);
            println!("  Files          {}", info.files);
            println!("  Data size      {} B", info.data_bytes);
        }
    }

    Ok(())
}
