mod llm;
mod parser;
mod pdf;
mod schedule;
mod status;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use parser::records::DirectiveRecord;
use status::{MemoryStatusStore, StatusStore, UploadStatus};

#[derive(Parser)]
#[command(name = "discharge_directives", about = "Extract time-bound patient directives from discharge PDFs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract directives from one PDF and print them as JSON
    Extract {
        pdf: PathBuf,
        /// Include directives with no time frame (time -1, unit "not found")
        #[arg(short, long)]
        all: bool,
        /// Use the hosted model instead of the keyword heuristics
        #[arg(long)]
        llm: bool,
        /// Procedure time (RFC 3339); adds ends_at and category to each directive
        #[arg(short, long, value_parser = parse_timestamp)]
        procedure_time: Option<DateTime<Utc>>,
    },
    /// Print the normalized fragments of each page
    Text { pdf: PathBuf },
    /// Run the heuristic pipeline over every PDF in a directory
    Batch {
        dir: PathBuf,
        /// Max files to process (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Extract {
            pdf,
            all,
            llm,
            procedure_time,
        } => {
            pdf::validate_upload(&pdf)?;
            let pages = pdf::read_pages(&pdf)?;

            let records = if llm {
                let client = llm::LlmClient::from_env()?;
                client
                    .extract(&pdf::joined_text(&pages), procedure_time)
                    .await?
            } else {
                let extraction = parser::process_pages(&pages);
                let unclassified: usize = extraction.unclassified().iter().map(Vec::len).sum();
                info!(unclassified, "fragments matched no trigger");
                extraction.into_records()
            };

            let total = records.len();
            let records = select_records(records, all);
            info!(total, emitted = records.len(), "directives extracted");

            let json = match procedure_time {
                Some(at) => to_envelope(schedule::schedule(records, at))?,
                None => to_envelope(records)?,
            };
            println!("{}", json);
            Ok(())
        }
        Commands::Text { pdf } => {
            pdf::validate_upload(&pdf)?;
            let pages = pdf::read_pages(&pdf)?;
            for page in parser::normalize::normalize_pages(&pages) {
                for fragment in &page {
                    println!("{}", fragment.message());
                }
                println!("{}", "-".repeat(52));
            }
            Ok(())
        }
        Commands::Batch { dir, limit } => {
            let files = list_pdfs(&dir, limit)?;
            if files.is_empty() {
                println!("No PDF files in {}.", dir.display());
                return Ok(());
            }
            println!("Processing {} files...", files.len());

            let store = MemoryStatusStore::new();
            let counts = process_files(&store, &files)?;
            report(&store);
            counts.print();

            store.evict_expired(Utc::now());
            for entry in store.snapshot() {
                if entry.status.is_finished() {
                    store.evict(&entry.id);
                }
            }
            if !store.is_empty() {
                warn!(remaining = store.len(), "uploads still tracked after batch");
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Resolved records only, unless `all` asks for the sentinel ones too.
fn select_records(records: Vec<DirectiveRecord>, all: bool) -> Vec<DirectiveRecord> {
    if all {
        records
    } else {
        records.into_iter().filter(|r| r.is_resolved()).collect()
    }
}

#[derive(Serialize)]
struct Envelope<T> {
    time_frames: Vec<T>,
}

fn to_envelope<T: Serialize>(time_frames: Vec<T>) -> Result<String> {
    serde_json::to_string_pretty(&Envelope { time_frames }).context("Failed to serialize directives")
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected RFC 3339 timestamp: {}", e))
}

fn list_pdfs(dir: &Path, limit: Option<usize>) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
        })
        .collect();
    files.sort();
    if let Some(n) = limit {
        files.truncate(n);
    }
    Ok(files)
}

struct BatchCounts {
    files: usize,
    failed: usize,
    records: usize,
    resolved: usize,
}

impl BatchCounts {
    fn print(&self) {
        println!(
            "Processed {} files ({} failed): {} directives, {} with a time frame.",
            self.files, self.failed, self.records, self.resolved,
        );
    }
}

/// Each file gets its own pipeline run; only the status store is shared.
fn process_files(store: &dyn StatusStore, files: &[PathBuf]) -> Result<BatchCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    for path in files {
        store.create(&upload_id(path))?;
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut counts = BatchCounts {
        files: 0,
        failed: 0,
        records: 0,
        resolved: 0,
    };

    for chunk in files.chunks(500) {
        let results: Vec<_> = chunk
            .par_iter()
            .map(|path| {
                let id = upload_id(path);
                if let Err(e) = store.update(&id, UploadStatus::Processing) {
                    warn!("Status update failed for {}: {:#}", id, e);
                }
                let outcome = pdf::validate_upload(path)
                    .and_then(|_| pdf::read_pages(path))
                    .map(|pages| parser::process_pages(&pages));
                let status = match &outcome {
                    Ok(extraction) => UploadStatus::Completed {
                        records: extraction.records().len(),
                        resolved: extraction.resolved_count(),
                    },
                    Err(e) => {
                        warn!("Failed {}: {:#}", path.display(), e);
                        UploadStatus::Failed {
                            error: format!("{:#}", e),
                        }
                    }
                };
                if let Err(e) = store.update(&id, status.clone()) {
                    warn!("Status update failed for {}: {:#}", id, e);
                }
                pb.inc(1);
                status
            })
            .collect();

        for status in results {
            counts.files += 1;
            match status {
                UploadStatus::Completed { records, resolved } => {
                    counts.records += records;
                    counts.resolved += resolved;
                }
                _ => counts.failed += 1,
            }
        }
    }

    pb.finish_and_clear();
    Ok(counts)
}

fn report(store: &MemoryStatusStore) {
    println!("{:<40} | {:<10} | {:>7} | {:>8}", "File", "Status", "Records", "Resolved");
    println!("{}", "-".repeat(74));
    for entry in store.snapshot() {
        let (label, records, resolved) = match &entry.status {
            UploadStatus::Completed { records, resolved } => ("completed", records.to_string(), resolved.to_string()),
            UploadStatus::Failed { .. } => ("failed", "-".into(), "-".into()),
            UploadStatus::Processing => ("processing", "-".into(), "-".into()),
            UploadStatus::Pending => ("pending", "-".into(), "-".into()),
        };
        println!(
            "{:<40} | {:<10} | {:>7} | {:>8}",
            truncate(&entry.id, 40),
            label,
            records,
            resolved
        );
    }
}

fn upload_id(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
