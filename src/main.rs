use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use imagepile::env::pool_dir;
use imagepile::lock::PoolLock;
use imagepile::signal::TerminationGuard;
use imagepile::store::Store;
use imagepile::{fsck, ImagepileError};

#[derive(Parser)]
#[command(name = "imagepile", version = "1.0.0", about = "Content-addressed block dedup store for disk images")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a byte stream into the pool, writing an image descriptor
    Add {
        /// Number of leading bytes of the first block to skip (0..4096); defaults to 0
        head_skip: Option<u32>,
        /// Input file, or '-' for stdin
        input: PathBuf,
        /// Descriptor output file, or '-' for stdout
        descriptor_out: PathBuf,
    },
    /// Reconstruct the original byte stream from an image descriptor
    Read {
        /// Descriptor input file, or '-' for stdin
        descriptor_in: PathBuf,
        /// Output file, or '-' for stdout
        output: PathBuf,
    },
    /// Print pool and index diagnostics (supplemental, not part of the wire format)
    Info,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    match run(Cli::parse().command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "imagepile failed");
            eprintln!("imagepile: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), ImagepileError> {
    match command {
        Commands::Add { head_skip, input, descriptor_out } => {
            cmd_add(head_skip.unwrap_or(0), &input, &descriptor_out)
        }
        Commands::Read { descriptor_in, output } => cmd_read(&descriptor_in, &output),
        Commands::Info => cmd_info(),
    }
}

fn cmd_add(head_skip: u32, input: &Path, descriptor_out: &Path) -> Result<(), ImagepileError> {
    let dir = pool_dir()?;
    let _lock = PoolLock::acquire(&dir)?;
    if let FsckOutcome::Repaired(ordinal) = run_fsck(&dir)? {
        tracing::warn!(ordinal, "repaired dangling tail block from a prior interrupted run");
    }
    let mut store = Store::open(&dir)?;
    let guard = TerminationGuard::install()?;

    if input.as_os_str() == "-" {
        write_descriptor(&mut store, io::stdin().lock(), descriptor_out, head_skip, &guard)
    } else {
        let f = std::fs::File::open(input).map_err(|e| ImagepileError::environment(&input.to_path_buf(), e))?;
        write_descriptor(&mut store, BufReader::new(f), descriptor_out, head_skip, &guard)
    }
}

fn write_descriptor<R: io::Read>(
    store: &mut Store,
    input: R,
    descriptor_out: &Path,
    head_skip: u32,
    guard: &TerminationGuard,
) -> Result<(), ImagepileError> {
    if descriptor_out.as_os_str() == "-" {
        let stdout = io::stdout();
        imagepile::ingest::ingest(store, input, BufWriter::new(stdout.lock()), head_skip, None, Some(guard))
    } else {
        let f = std::fs::File::create(descriptor_out)
            .map_err(|e| ImagepileError::environment(&descriptor_out.to_path_buf(), e))?;
        imagepile::ingest::ingest(store, input, BufWriter::new(f), head_skip, None, Some(guard))
    }
}

fn cmd_read(descriptor_in: &Path, output: &Path) -> Result<(), ImagepileError> {
    let dir = pool_dir()?;
    let _lock = PoolLock::acquire(&dir)?;
    run_fsck(&dir)?;
    let mut store = Store::open(&dir)?;

    let write_stdout = output.as_os_str() == "-";
    let read_stdin = descriptor_in.as_os_str() == "-";

    match (read_stdin, write_stdout) {
        (true, true) => {
            let stdout = io::stdout();
            imagepile::reconstruct::reconstruct(&mut store, io::stdin().lock(), BufWriter::new(stdout.lock()))
        }
        (true, false) => {
            let f = std::fs::File::create(output).map_err(|e| ImagepileError::environment(&output.to_path_buf(), e))?;
            imagepile::reconstruct::reconstruct(&mut store, io::stdin().lock(), BufWriter::new(f))
        }
        (false, true) => {
            let f = std::fs::File::open(descriptor_in)
                .map_err(|e| ImagepileError::environment(&descriptor_in.to_path_buf(), e))?;
            let stdout = io::stdout();
            imagepile::reconstruct::reconstruct(&mut store, BufReader::new(f), BufWriter::new(stdout.lock()))
        }
        (false, false) => {
            let f = std::fs::File::open(descriptor_in)
                .map_err(|e| ImagepileError::environment(&descriptor_in.to_path_buf(), e))?;
            let out = std::fs::File::create(output)
                .map_err(|e| ImagepileError::environment(&output.to_path_buf(), e))?;
            imagepile::reconstruct::reconstruct(&mut store, BufReader::new(f), BufWriter::new(out))
        }
    }
}

fn cmd_info() -> Result<(), ImagepileError> {
    let dir = pool_dir()?;
    let store = Store::open(&dir)?;
    store.check_lockstep()?;

    println!("── imagepile pool ───────────────────────────────────────");
    println!("  Directory      {}", dir.display());
    println!("  Blocks         {}", store.block_count()?);
    println!("  Fingerprints   {}", store.index_len());
    Ok(())
}

enum FsckOutcome {
    Clean,
    Repaired(u32),
}

fn run_fsck(dir: &Path) -> Result<FsckOutcome, ImagepileError> {
    match fsck::check_and_repair(dir)? {
        fsck::FsckReport::Clean { .. } => Ok(FsckOutcome::Clean),
        fsck::FsckReport::Repaired { discarded_ordinal } => Ok(FsckOutcome::Repaired(discarded_ordinal)),
    }
}
