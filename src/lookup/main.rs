//! Command-line point-in-polygon lookups.
//!
//! Loads the configured WOF layers, then resolves each `--point` (or each
//! `lat,lon` line on stdin) and prints one JSON line per point.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use wof_pip::{AdminArea, Coordinator, PipConfig};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "lookup")]
#[command(about = "Resolve points against Who's On First admin layers")]
struct Args {
    /// WOF data root containing meta/ and data/
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// TOML config file; command-line flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Comma-separated layers to load
    #[arg(long, value_delimiter = ',')]
    layers: Option<Vec<String>>,

    /// Use localized names and abbreviations
    #[arg(long)]
    localized: bool,

    /// Fail if any layer's metadata file is missing
    #[arg(long)]
    fatal_missing: bool,

    /// Point to resolve as `lat,lon`; repeatable. Reads stdin when absent.
    #[arg(short, long = "point", value_parser = parse_point)]
    points: Vec<(f64, f64)>,

    /// Lookups in flight at once
    #[arg(long, default_value = "64")]
    concurrency: usize,
}

fn parse_point(s: &str) -> Result<(f64, f64), String> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| format!("expected lat,lon, got {:?}", s))?;
    let lat: f64 = lat.trim().parse().map_err(|e| format!("bad latitude: {}", e))?;
    let lon: f64 = lon.trim().parse().map_err(|e| format!("bad longitude: {}", e))?;
    Ok((lat, lon))
}

#[derive(Serialize)]
struct Output {
    lat: f64,
    lon: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    results: Vec<AdminArea>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn build_config(args: &Args) -> Result<PipConfig> {
    let mut config = match &args.config {
        Some(path) => PipConfig::load_from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => PipConfig::default(),
    };
    if let Some(data) = &args.data {
        config.data_root = data.clone();
    }
    if let Some(layers) = &args.layers {
        config.layers = Some(layers.clone());
    }
    config.localized_admin_names |= args.localized;
    config.missing_metafiles_are_fatal |= args.fatal_missing;
    Ok(config)
}

fn read_stdin_points() -> Result<Vec<(f64, f64)>> {
    let mut points = Vec::new();
    for line in std::io::stdin().lock().lines() {
        let line = line.context("Failed to read stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_point(line) {
            Ok(point) => points.push(point),
            Err(e) => warn!("Skipping input line {:?}: {}", line, e),
        }
    }
    Ok(points)
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let config = build_config(&args)?;

    info!("WOF PIP lookup");
    info!("Data root: {}", config.data_root.display());

    let coordinator = Coordinator::create(&config).await?;

    let points = if args.points.is_empty() {
        read_stdin_points()?
    } else {
        args.points.clone()
    };

    let coordinator_ref = &coordinator;
    let outputs: Vec<Output> = stream::iter(points)
        .map(|(lat, lon)| async move {
            match coordinator_ref.lookup::<&str>(lat, lon, None).await {
                Ok(results) => Output {
                    lat,
                    lon,
                    results,
                    error: None,
                },
                Err(e) => Output {
                    lat,
                    lon,
                    results: Vec::new(),
                    error: Some(e.to_string()),
                },
            }
        })
        .buffered(args.concurrency.max(1))
        .collect()
        .await;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for output in &outputs {
        serde_json::to_writer(&mut out, output)?;
        writeln!(out)?;
    }
    drop(out);

    info!("Resolved {} points", outputs.len());
    coordinator.end().await;
    Ok(())
}
