//! Ingest command - upload local files and drive them through the pipeline.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, warn};

use idp_core::storage::content_type_for;
use idp_core::transport::{DeliveryOutcome, DeliveryReport};

use super::LocalContext;

/// Arguments for the ingest command.
#[derive(Args)]
pub struct IngestArgs {
    /// Input files or glob pattern
    #[arg(required = true)]
    input: String,

    /// Prefix each key with a random id, as upload grants do
    #[arg(long)]
    unique_keys: bool,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,

    /// Write a per-delivery summary CSV
    #[arg(long)]
    summary: Option<PathBuf>,
}

/// One file accepted into the object store.
struct Ingested {
    path: PathBuf,
    key: String,
}

pub async fn run(args: IngestArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let ctx = LocalContext::load(config_path)?;
    let pipeline = ctx.pipeline();

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| p.is_file())
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to ingest",
        style("ℹ").blue(),
        files.len()
    );

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files",
            )?
            .progress_chars("=>-"),
    );

    let mut ingested = Vec::with_capacity(files.len());
    let mut upload_failures = Vec::new();

    for path in files {
        let key = object_key(&path, args.unique_keys);
        let result = match fs::read(&path) {
            Ok(body) => pipeline
                .ingest(&key, body, content_type_for(&key))
                .await
                .map_err(anyhow::Error::from),
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(_) => ingested.push(Ingested { path, key }),
            Err(e) => {
                if args.continue_on_error {
                    warn!("Failed to ingest {}: {}", path.display(), e);
                    upload_failures.push((path, e.to_string()));
                } else {
                    error!("Failed to ingest {}: {}", path.display(), e);
                    anyhow::bail!("Ingest failed: {}", e);
                }
            }
        }
        pb.inc(1);
    }

    pb.set_message("waiting for deliveries");
    let reports = pipeline.settle().await;
    pb.finish_and_clear();

    if let Some(summary_path) = &args.summary {
        write_summary(summary_path, &reports)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    let dead = pipeline.dead_letters();

    println!();
    println!(
        "{} Ingested {} files in {:?}",
        style("✓").green(),
        ingested.len(),
        start.elapsed()
    );
    println!(
        "   {} deliveries succeeded, {} dead-lettered",
        style(reports.iter().filter(|r| r.is_delivered()).count()).green(),
        style(dead.len()).red()
    );
    for item in &ingested {
        println!("   {} -> {}", item.path.display(), item.key);
    }

    if !upload_failures.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for (path, reason) in &upload_failures {
            println!("  - {}: {}", path.display(), reason);
        }
    }

    if !dead.is_empty() {
        println!();
        println!("{}", style("Dead letters:").red());
        for letter in &dead {
            println!(
                "  - {} [{}] after {} attempt(s): {}",
                letter.subscriber, letter.kind, letter.attempts, letter.error
            );
        }
    }

    Ok(())
}

fn object_key(path: &Path, unique: bool) -> String {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("document");

    if unique {
        format!("{}-{}", uuid::Uuid::new_v4(), name)
    } else {
        name.to_string()
    }
}

fn write_summary(path: &Path, reports: &[DeliveryReport]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record(["message_id", "subscriber", "status", "attempts", "error_kind", "error"])?;

    for report in reports {
        let (status, kind, error) = match &report.outcome {
            DeliveryOutcome::Delivered => ("delivered", String::new(), String::new()),
            DeliveryOutcome::DeadLettered(dead) => {
                ("dead_lettered", dead.kind.to_string(), dead.error.clone())
            }
        };
        wtr.write_record([
            report.message_id.as_str(),
            report.subscriber.as_str(),
            status,
            &report.attempts.to_string(),
            &kind,
            &error,
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key() {
        assert_eq!(object_key(Path::new("/tmp/in/high-invoice.pdf"), false), "high-invoice.pdf");

        let unique = object_key(Path::new("scan.jpg"), true);
        assert!(unique.ends_with("-scan.jpg"));
        assert_eq!(unique.len(), 36 + "-scan.jpg".len());
    }
}
