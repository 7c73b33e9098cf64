//! Dataset Replay
//!
//! Feeds a recorded sensor dataset through the full detection pipeline:
//! Baseline Estimator → {Physics Engine, Residual Classifier} → Fusion →
//! Calibration, in record order, and prints detection quality at the end.
//!
//! Usage:
//!   cargo run --bin replay -- --dataset data/leakage.csv --model model.json
//!   cargo run --bin replay -- --dataset data/leakage.csv --model model.json --sample

use anyhow::Context;
use clap::Parser;
use hydrosentry::config::NetworkConfig;
use hydrosentry::types::{Status, SystemStatistics};
use hydrosentry::{BaselineModel, Dataset, DigitalTwin, NetworkState};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "replay", about = "Replay a sensor dataset through the leak detection engine")]
struct Args {
    /// Path to the dataset CSV
    #[arg(long)]
    dataset: PathBuf,

    /// Path to the baseline model artifact (JSON)
    #[arg(long)]
    model: PathBuf,

    /// Optional network config TOML (defaults to the standard search order)
    #[arg(long)]
    config: Option<PathBuf>,

    /// First record index to analyze
    #[arg(long, default_value_t = 0)]
    start: usize,

    /// One past the last record index (defaults to the dataset length)
    #[arg(long)]
    end: Option<usize>,

    /// Subsample via the engine's strided statistics pass instead of
    /// replaying every record
    #[arg(long, default_value_t = false)]
    sample: bool,
}

// ============================================================================
// Full-replay statistics
// ============================================================================

/// Confusion counts accumulated across a full in-order replay.
///
/// The replay consumes each record exactly once, so these are tallied from
/// the verdict stream rather than by re-running `system_statistics` (which
/// would feed the calibration windows a second time).
#[derive(Default)]
struct ReplayStats {
    total: usize,
    leaks: usize,
    suspects: usize,
    calibration_fires: usize,
    true_positives: usize,
    false_positives: usize,
    true_negatives: usize,
    false_negatives: usize,
    leaks_by_zone: BTreeMap<String, usize>,
}

impl ReplayStats {
    fn record(&mut self, verdict: &hydrosentry::Verdict) {
        self.total += 1;
        if verdict.calibration_fired {
            self.calibration_fires += 1;
        }

        let truth_leak = verdict.ground_truth.is_leak();
        match verdict.status {
            Status::Leak => {
                self.leaks += 1;
                *self.leaks_by_zone.entry(verdict.zone.clone()).or_insert(0) += 1;
                if truth_leak {
                    self.true_positives += 1;
                } else {
                    self.false_positives += 1;
                }
            }
            Status::Suspect => {
                self.suspects += 1;
                if truth_leak {
                    self.true_positives += 1;
                } else {
                    self.false_positives += 1;
                }
            }
            _ => {
                if truth_leak {
                    self.false_negatives += 1;
                } else {
                    self.true_negatives += 1;
                }
            }
        }
    }

    fn pct(numerator: usize, denominator: usize) -> f64 {
        if denominator == 0 {
            0.0
        } else {
            numerator as f64 / denominator as f64 * 100.0
        }
    }

    fn print(&self) {
        println!("=== Replay Summary ===");
        println!("records analyzed:   {}", self.total);
        println!("leak verdicts:      {}", self.leaks);
        println!("suspect verdicts:   {}", self.suspects);
        println!("calibration fires:  {}", self.calibration_fires);
        println!(
            "accuracy:  {:.2}%",
            Self::pct(self.true_positives + self.true_negatives, self.total)
        );
        println!(
            "precision: {:.2}%",
            Self::pct(self.true_positives, self.true_positives + self.false_positives)
        );
        println!(
            "recall:    {:.2}%",
            Self::pct(self.true_positives, self.true_positives + self.false_negatives)
        );
        println!(
            "TP {} | FP {} | TN {} | FN {}",
            self.true_positives, self.false_positives, self.true_negatives, self.false_negatives
        );
        if !self.leaks_by_zone.is_empty() {
            println!("leak verdicts by zone:");
            for (zone, count) in &self.leaks_by_zone {
                println!("  {zone}: {count}");
            }
        }
    }
}

fn print_sampled(stats: &SystemStatistics) {
    println!("=== Sampled Statistics ===");
    println!("{stats}");
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => NetworkConfig::load_from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => NetworkConfig::load(),
    };

    // A missing model artifact is fatal: there is no degraded mode without
    // an expectation to compare against.
    let model = BaselineModel::load(&args.model).context("loading baseline model artifact")?;
    let dataset = Dataset::load(&args.dataset).context("loading dataset")?;

    let start = args.start;
    let end = args.end.unwrap_or(dataset.len()).min(dataset.len());
    anyhow::ensure!(start < end, "empty record range {start}..{end}");

    let mut twin = DigitalTwin::new(config, model, dataset, NetworkState::new());

    if args.sample {
        let stats = twin.system_statistics(start, end);
        print_sampled(&stats);
        return Ok(());
    }

    let mut stats = ReplayStats::default();
    for index in start..end {
        let verdict = twin.analyze(index);
        if verdict.status != Status::Normal {
            info!("{verdict}");
        }
        stats.record(&verdict);
    }

    stats.print();
    println!(
        "calibrated segments: {}/{}",
        twin.network().calibrated_count(),
        twin.network().len()
    );

    Ok(())
}
