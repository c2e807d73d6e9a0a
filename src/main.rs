use clap::{ArgAction, Parser, Subcommand};
use ira::archive::{Archive, PackOptions, Progress, UnpackOptions};
use ira::split::{ChunkPolicy, UNSPLIT_SENTINEL};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "ira", version, about = "Split archives into verified .ira parts")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a file or directory into one or more .ira parts
    Pack {
        source: PathBuf,
        /// Output base name, without extension
        #[arg(short, long)]
        output: PathBuf,
        /// Part size in KiB, -1 to write a single part
        #[arg(long, default_value_t = UNSPLIT_SENTINEL, allow_negative_numbers = true)]
        chunk_size: i64,
        /// Deflate level 0-9
        #[arg(short, long)]
        level: Option<i32>,
        /// Version tag written into every header
        #[arg(long, default_value = ira::FORMAT_VERSION)]
        format_version: String,
    },
    /// Reassemble, verify and extract an archive
    Unpack {
        /// Base name, single-part file, or any part of a set
        archive: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
        /// Extract directly into the destination instead of staging first
        #[arg(long)]
        in_place: bool,
    },
    /// Reassemble and verify without extracting
    Verify {
        archive: PathBuf,
    },
    /// List the parts found for an archive
    Info {
        archive: PathBuf,
        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    let ar = Archive::new();

    match command {

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { source, output, chunk_size, level, format_version } => {
            let opts = PackOptions {
                chunk_policy:      ChunkPolicy::from_kib(chunk_size)?,
                format_version,
                compression_level: level,
            };
            let mut report = |event: Progress<'_>| {
                if let Progress::PartWritten { index, count, path } = event {
                    println!("  part {index}/{count} written: {}", path.display());
                }
            };
            let summary = ar.pack(&source, &output, &opts, Some(&mut report))?;
            println!("Packed {} ({} bytes, {} part(s))",
                     source.display(), summary.payload_len, summary.parts.len());
            println!("Digest: {}", summary.content_digest);
        }

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { archive, output_dir, in_place } => {
            let opts = UnpackOptions { staged: !in_place };
            let mut report = |event: Progress<'_>| {
                if let Progress::EntryExtracted { index, total, name } = event {
                    println!("  [{index}/{total}] {name}");
                }
            };
            let summary = ar.unpack(&archive, &output_dir, &opts, Some(&mut report))?;
            println!("Computed digest: {}", summary.verified.computed_digest);
            println!("Expected digest: {}", summary.verified.expected_digest);
            println!("Unpacked {} entries to: {}", summary.entries, summary.destination.display());
        }

        // ── Verify ───────────────────────────────────────────────────────────
        Commands::Verify { archive } => {
            let summary = ar.verify(&archive)?;
            println!("Computed digest: {}", summary.computed_digest);
            println!("Expected digest: {}", summary.expected_digest);
            println!("OK: {} part(s), {} bytes, format {}",
                     summary.part_count, summary.payload_len, summary.format_version);
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { archive, json } => {
            let index = ar.inspect(&archive)?;
            if json {
                println!("{}", index.to_json()?);
                return Ok(());
            }
            println!("{:<40} {:>6} {:>6} {:>12}  Digest", "Part", "Index", "Count", "Payload");
            for r in &index.records {
                println!("{:<40} {:>6} {:>6} {:>12}  {}",
                    r.file.display(), r.part_index, r.part_count, r.payload_size, r.content_digest);
            }
            println!("Total payload  {} B", index.payload_size);
            if !index.missing.is_empty() {
                println!("Missing parts  {:?}", index.missing);
            }
            match &index.problem {
                None    => println!("Status         complete"),
                Some(p) => println!("Status         {p}"),
            }
        }
    }

    Ok(())
}
