//! CLI binary for docbind.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `BatchConfig` and writes the assembled output to disk.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use docbind::{label_split, merge, BatchConfig, InputDocument};
use serde::Deserialize;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Merge three documents into one PDF, numbering the invoices
  docbind merge invoice1.pdf invoice2.docx receipt.jpg \
      --labels INV,INV,RCPT --start-numbers 100,100,7 -o bundle.pdf

  # '-' leaves a document unstamped
  docbind merge a.pdf b.pdf --labels INV,INV --start-numbers 100,- -o out.pdf

  # Merge behind a cover page listing the categories
  docbind merge a.pdf b.xlsx --labels INV,PO --start-numbers 1,1 --cover -o out.pdf

  # Split into a zip archive of standalone PDFs, grouped by category
  docbind split a.pdf b.pdf c.csv --labels INV,INV,PO --start-numbers 1,1,1 -o batch.zip

  # Drive a batch from a JSON manifest
  docbind merge --manifest batch.json -o bundle.pdf

MANIFEST FORMAT (JSON):
  [
    {"file": "invoice.pdf", "label": "INV", "start_number": 100},
    {"file": "receipt.jpg", "label": "RCPT"}
  ]
  Entries without "start_number" are included unstamped.

ENVIRONMENT VARIABLES:
  DOCBIND_OFFICE   Comma list of office executable candidates, tried in order
  RUST_LOG         Tracing filter (overrides -v/-q)
"#;

/// Convert, label, and assemble document batches.
#[derive(Parser, Debug)]
#[command(
    name = "docbind",
    version,
    about = "Convert documents to PDF, stamp category numbers, and assemble the batch",
    arg_required_else_help = true,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge the batch into one PDF.
    Merge(BatchArgs),
    /// Split the batch into a zip archive, one PDF per input.
    Split(BatchArgs),
}

#[derive(clap::Args, Debug)]
struct BatchArgs {
    /// Input files, in batch order.
    files: Vec<PathBuf>,

    /// Comma-separated labels aligned with the files (default: all blank).
    #[arg(long)]
    labels: Option<String>,

    /// Comma-separated start numbers aligned with the files; '-' skips
    /// stamping that document.
    #[arg(long)]
    start_numbers: Option<String>,

    /// JSON manifest replacing files/labels/start numbers.
    #[arg(long, conflicts_with_all = ["files", "labels", "start_numbers"])]
    manifest: Option<PathBuf>,

    /// Output path (a PDF for merge, a zip archive for split).
    #[arg(short, long)]
    output: PathBuf,

    /// Prepend a cover page listing the categories (merge only).
    #[arg(long)]
    cover: bool,

    /// Office executable candidates (comma list), tried in order.
    #[arg(long, env = "DOCBIND_OFFICE")]
    office: Option<String>,

    /// Per-attempt external tool timeout in seconds.
    #[arg(long, default_value_t = 60)]
    office_timeout: u64,
}

#[derive(Deserialize, Debug)]
struct ManifestEntry {
    file: PathBuf,
    #[serde(default)]
    label: String,
    #[serde(default)]
    start_number: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Merge(args) => run(args, true, cli.quiet).await,
        Command::Split(args) => run(args, false, cli.quiet).await,
    }
}

async fn run(args: BatchArgs, merge_mode: bool, quiet: bool) -> Result<()> {
    let mut builder = BatchConfig::builder()
        .office_timeout_secs(args.office_timeout)
        .include_cover(args.cover);
    if let Some(ref office) = args.office {
        builder = builder.office_executables(
            office
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
        );
    }
    let config = builder.build().context("invalid configuration")?;

    let (documents, labels, start_numbers) = load_batch(&args).await?;

    let bytes = if merge_mode {
        merge(&documents, &labels, &start_numbers, &config)
            .await
            .context("merge failed")?
    } else {
        label_split(&documents, &labels, &start_numbers, &config)
            .await
            .context("split failed")?
    };

    tokio::fs::write(&args.output, &bytes)
        .await
        .with_context(|| format!("could not write {}", args.output.display()))?;

    if !quiet {
        eprintln!("wrote {} ({} bytes)", args.output.display(), bytes.len());
    }
    Ok(())
}

/// Assemble the aligned batch arrays from either the manifest or the
/// positional files plus comma lists.
async fn load_batch(args: &BatchArgs) -> Result<(Vec<InputDocument>, Vec<String>, Vec<Option<u32>>)> {
    if let Some(ref manifest_path) = args.manifest {
        let text = tokio::fs::read_to_string(manifest_path)
            .await
            .with_context(|| format!("could not read manifest {}", manifest_path.display()))?;
        let entries: Vec<ManifestEntry> =
            serde_json::from_str(&text).context("manifest is not valid JSON")?;

        let mut documents = Vec::with_capacity(entries.len());
        let mut labels = Vec::with_capacity(entries.len());
        let mut start_numbers = Vec::with_capacity(entries.len());
        for entry in entries {
            documents.push(read_input(&entry.file).await?);
            labels.push(entry.label);
            start_numbers.push(entry.start_number);
        }
        return Ok((documents, labels, start_numbers));
    }

    if args.files.is_empty() {
        bail!("no input files; pass files or --manifest");
    }

    let mut documents = Vec::with_capacity(args.files.len());
    for path in &args.files {
        documents.push(read_input(path).await?);
    }

    let labels = match &args.labels {
        Some(list) => list.split(',').map(|s| s.trim().to_string()).collect(),
        None => vec![String::new(); documents.len()],
    };
    let start_numbers = match &args.start_numbers {
        Some(list) => parse_start_numbers(list)?,
        None => vec![None; documents.len()],
    };
    Ok((documents, labels, start_numbers))
}

async fn read_input(path: &PathBuf) -> Result<InputDocument> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("could not read {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("unusable file name: {}", path.display()))?;
    Ok(InputDocument::new(name, bytes))
}

/// Parse a comma list of start numbers where '-' (or empty) means "no
/// stamp for this document".
fn parse_start_numbers(list: &str) -> Result<Vec<Option<u32>>> {
    list.split(',')
        .map(|item| {
            let item = item.trim();
            if item.is_empty() || item == "-" {
                Ok(None)
            } else {
                item.parse::<u32>()
                    .map(Some)
                    .with_context(|| format!("invalid start number '{item}'"))
            }
        })
        .collect()
}
