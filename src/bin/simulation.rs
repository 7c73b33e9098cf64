//! Synthetic Dataset Generator
//!
//! Produces a location-aware leakage dataset CSV from a known linear flow law
//! plus Gaussian sensor noise, injecting leak episodes (excess flow with a
//! pressure sag), and writes a matching baseline-model artifact. Gives the
//! replay binary something deterministic to chew on without field data.
//!
//! Usage:
//!   cargo run --bin simulation -- --records 5000 --out data/sim.csv --model-out model.json

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use hydrosentry::baseline::{ModelArtifact, ARTIFACT_SCHEMA_VERSION};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "simulation", about = "Generate a synthetic leakage dataset and model artifact")]
struct Args {
    /// Number of records to generate
    #[arg(long, default_value_t = 5000)]
    records: usize,

    /// Number of pipe segments (spread across zones and blocks)
    #[arg(long, default_value_t = 12)]
    segments: usize,

    /// Probability that a record falls inside a leak episode
    #[arg(long, default_value_t = 0.08)]
    leak_probability: f64,

    /// RNG seed for reproducible datasets
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Output CSV path
    #[arg(long, default_value = "data/sim.csv")]
    out: PathBuf,

    /// Output model artifact path
    #[arg(long, default_value = "model.json")]
    model_out: PathBuf,
}

/// True flow law the synthetic sensors obey (and the artifact encodes)
struct FlowLaw {
    intercept: f64,
    pressure: f64,
    temperature: f64,
    rpm: f64,
    operational_hours: f64,
    vibration: f64,
}

const LAW: FlowLaw = FlowLaw {
    intercept: 8.0,
    pressure: 0.45,
    temperature: 0.12,
    rpm: 0.008,
    operational_hours: 0.0002,
    vibration: -1.5,
};

impl FlowLaw {
    fn flow(&self, pressure: f64, temperature: f64, rpm: f64, hours: f64, vibration: f64) -> f64 {
        self.intercept
            + self.pressure * pressure
            + self.temperature * temperature
            + self.rpm * rpm
            + self.operational_hours * hours
            + self.vibration * vibration
    }

    fn artifact(&self) -> ModelArtifact {
        ModelArtifact {
            schema_version: ARTIFACT_SCHEMA_VERSION,
            trained_at: Utc::now(),
            features: vec![
                "pressure".to_string(),
                "temperature".to_string(),
                "rpm".to_string(),
                "operational_hours".to_string(),
                "vibration".to_string(),
            ],
            coefficients: vec![
                self.pressure,
                self.temperature,
                self.rpm,
                self.operational_hours,
                self.vibration,
            ],
            intercept: self.intercept,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut rng = StdRng::seed_from_u64(args.seed);

    let pressure_noise = Normal::new(0.0, 2.0).context("pressure noise")?;
    let flow_noise = Normal::new(0.0, 1.0).context("flow noise")?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let mut csv = std::fs::File::create(&args.out)
        .with_context(|| format!("creating {}", args.out.display()))?;
    writeln!(
        csv,
        "Location_Code,Zone,Block,Pipe,Latitude,Longitude,Flow_Rate,Pressure,Temperature,RPM,Operational_Hours,Vibration,Leakage_Flag"
    )?;

    let mut leak_records = 0usize;
    for i in 0..args.records {
        let segment = i % args.segments;
        let zone = segment / 4 + 1;
        let block = segment % 4 / 2 + 1;
        let pipe = segment % 2 + 1;
        let segment_id = format!("Zone_{zone}_Block_{block}_Pipe_{pipe}");
        let lat = 3.05 + zone as f64 * 0.02 + block as f64 * 0.005;
        let lon = 101.55 + zone as f64 * 0.03 + pipe as f64 * 0.004;

        // Operating conditions wander around nominal values
        let mut pressure = 65.0 + pressure_noise.sample(&mut rng);
        let temperature = 25.0 + rng.gen_range(-3.0..3.0);
        let rpm = 1450.0 + rng.gen_range(-40.0..40.0);
        let hours = 1000.0 + i as f64 * 0.01;
        let vibration = 0.4 + rng.gen_range(-0.1..0.1);

        let baseline_flow =
            LAW.flow(pressure, temperature, rpm, hours, vibration) + flow_noise.sample(&mut rng);

        let is_leak = rng.gen_bool(args.leak_probability);
        let flow = if is_leak {
            // Leak: extra exit point, so flow runs high while pressure sags
            pressure *= rng.gen_range(0.80..0.88);
            baseline_flow * rng.gen_range(1.25..1.60)
        } else {
            baseline_flow
        };
        if is_leak {
            leak_records += 1;
        }

        writeln!(
            csv,
            "{segment_id},Zone_{zone},Block_{block},Pipe_{pipe},{lat:.4},{lon:.4},{flow:.2},{pressure:.2},{temperature:.2},{rpm:.2},{hours:.2},{vibration:.3},{}",
            u8::from(is_leak)
        )?;
    }

    let artifact = LAW.artifact();
    std::fs::write(&args.model_out, serde_json::to_string_pretty(&artifact)?)
        .with_context(|| format!("writing {}", args.model_out.display()))?;

    info!(
        records = args.records,
        leak_records,
        dataset = %args.out.display(),
        model = %args.model_out.display(),
        "Synthetic dataset generated"
    );

    Ok(())
}
