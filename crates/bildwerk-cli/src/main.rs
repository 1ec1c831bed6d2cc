// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bildwerk — PDF image extraction with duplicate folding
//
// Entry point. Initialises logging, merges the config file with command-line
// overrides, and runs the batch over the given PDFs or folders.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use bildwerk_core::config::ExtractConfig;
use bildwerk_core::error::Result;
use bildwerk_core::report::{BatchReport, RunStatus};
use bildwerk_document::{BatchRun, collect_inputs};
use clap::Parser;
use tracing::{error, info};

/// Exit code for problems that stop the run before any document is opened.
const SETUP_FAILURE: u8 = 1;

#[derive(Debug, Parser)]
#[command(name = "bildwerk")]
#[command(about = "Extract embedded images from PDFs, one file per distinct image")]
#[command(version)]
struct Cli {
    /// PDF files, or folders whose *.pdf files are processed in name order.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Root folder for per-document output.
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// JSON config file; flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Worker threads.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Assets allowed in flight ahead of the in-order consumer.
    #[arg(long)]
    queue_depth: Option<usize>,

    /// Only fold byte-identical images.
    #[arg(long)]
    no_perceptual: bool,

    /// Write the batch report as JSON to this file.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Write the effective configuration to this file and continue.
    #[arg(long)]
    save_config: Option<PathBuf>,
}

impl Cli {
    /// Config file (or defaults) with command-line overrides applied.
    fn effective_config(&self) -> Result<ExtractConfig> {
        let mut config = match &self.config {
            Some(path) => ExtractConfig::load(path)?,
            None => ExtractConfig::default(),
        };
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(queue_depth) = self.queue_depth {
            config.queue_depth = queue_depth;
        }
        if self.no_perceptual {
            config.perceptual_matching = false;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!("Bildwerk starting");

    match run(&cli) {
        Ok(status) => {
            let code = u8::try_from(status.exit_code()).unwrap_or(SETUP_FAILURE);
            ExitCode::from(code)
        }
        Err(err) => {
            error!(%err, "Run aborted");
            ExitCode::from(SETUP_FAILURE)
        }
    }
}

fn run(cli: &Cli) -> Result<RunStatus> {
    let config = cli.effective_config()?;
    if let Some(path) = &cli.save_config {
        config.save(path)?;
        info!(path = %path.display(), "Configuration saved");
    }

    let documents = collect_inputs(&cli.inputs)?;
    std::fs::create_dir_all(&cli.output)?;
    info!(
        documents = documents.len(),
        output = %cli.output.display(),
        workers = config.workers,
        "Batch starting"
    );

    let batch = BatchRun::new(&cli.output, &config).run(&documents);
    if let Some(path) = &cli.report {
        write_report(&batch, path)?;
    }
    Ok(batch.status())
}

fn write_report(batch: &BatchReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(batch)?;
    std::fs::write(path, json)?;
    info!(path = %path.display(), "Batch report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bildwerk.json");
        std::fs::write(&path, r#"{ "workers": 2, "queue_depth": 8 }"#).unwrap();

        let cli = Cli::try_parse_from([
            "bildwerk",
            "in",
            "--config",
            path.to_str().unwrap(),
            "--workers",
            "6",
            "--no-perceptual",
        ])
        .unwrap();
        let config = cli.effective_config().unwrap();
        assert_eq!(config.workers, 6);
        assert_eq!(config.queue_depth, 8);
        assert!(!config.perceptual_matching);
        assert_eq!(config.asset_dir_name, "Image");
    }

    #[test]
    fn zero_workers_is_rejected() {
        let cli = Cli::try_parse_from(["bildwerk", "in", "-w", "0"]).unwrap();
        assert!(cli.effective_config().is_err());
    }

    #[test]
    fn inputs_are_required() {
        assert!(Cli::try_parse_from(["bildwerk"]).is_err());
    }

    #[test]
    fn empty_folder_runs_clean_and_writes_report() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let report = output.path().join("report.json");

        let cli = Cli::try_parse_from([
            "bildwerk",
            input.path().to_str().unwrap(),
            "--output",
            output.path().to_str().unwrap(),
            "--report",
            report.to_str().unwrap(),
        ])
        .unwrap();

        assert_eq!(run(&cli).unwrap(), RunStatus::Clean);
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(report).unwrap()).unwrap();
        assert_eq!(json["documents"], serde_json::json!([]));
    }

    #[test]
    fn missing_input_is_a_setup_failure() {
        let output = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from([
            "bildwerk",
            "/definitely/not/here",
            "--output",
            output.path().to_str().unwrap(),
        ])
        .unwrap();
        assert!(run(&cli).is_err());
    }
}
