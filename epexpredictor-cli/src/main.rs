//! epexpredictor CLI: refresh, inspect and export the cached price,
//! weather and calendar data of one bidding zone.
//!
//! Commands:
//! - `refresh`: run one refresh cycle (retention, forecast revalidation, delta fetch)
//! - `status`: report rows, covered range and next revalidation per store, offline
//! - `export`: write a slice of one store to CSV
//! - `watch`: keep the region warm, refreshing whenever a store is due

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use epexpredictor_core::store::StoreKind;
use epexpredictor_core::{AppConfig, DataStore, Frame, RegionName, RegionStores, WarmCoordinator};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "epexpredictor",
    about = "epexpredictor: delta-fetch caches for day-ahead price forecasting"
)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Bidding-zone region: DE, AT, BE or NL.
    #[arg(long, global = true, default_value = "DE")]
    region: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one refresh cycle and print what changed.
    Refresh,
    /// Show what every store holds. Never touches the network.
    Status,
    /// Export one store's rows in a time range to CSV.
    Export {
        #[arg(long, value_enum)]
        kind: KindArg,

        /// Range start (RFC 3339 or YYYY-MM-DD, UTC).
        #[arg(long)]
        start: String,

        /// Range end, inclusive (RFC 3339 or YYYY-MM-DD, UTC).
        #[arg(long)]
        end: String,

        /// Output CSV path.
        #[arg(long)]
        output: PathBuf,

        /// Fetch missing days before exporting.
        #[arg(long, default_value_t = false)]
        fetch: bool,
    },
    /// Keep the region warm until interrupted.
    Watch {
        /// Stop after this many cycles.
        #[arg(long)]
        cycles: Option<u32>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Price,
    Weather,
    Calendar,
}

impl From<KindArg> for StoreKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Price => StoreKind::Price,
            KindArg::Weather => StoreKind::Weather,
            KindArg::Calendar => StoreKind::Calendar,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load config")?;
    let region: RegionName = cli.region.parse()?;
    let stores = RegionStores::open(region.region(), &config)
        .with_context(|| format!("failed to open stores for {region}"))?;

    match cli.command {
        Commands::Refresh => run_refresh(&stores),
        Commands::Status => run_status(&stores),
        Commands::Export {
            kind,
            start,
            end,
            output,
            fetch,
        } => run_export(&stores, kind.into(), &start, &end, &output, fetch),
        Commands::Watch { cycles } => run_watch(stores, cycles),
    }
}

fn run_refresh(stores: &RegionStores) -> Result<()> {
    let outcome = stores.refresh_at(Utc::now());
    for store in stores.stores() {
        let core = store.core();
        let marker = if outcome.updated.contains(&store.kind()) {
            "updated"
        } else {
            "unchanged"
        };
        println!(
            "{:<10} {:>8} rows  last {}  ({marker})",
            store.kind(),
            core.len(),
            format_opt(core.last_known()),
        );
    }
    println!("Next refresh: {}", outcome.next_refresh.to_rfc3339());
    Ok(())
}

fn run_status(stores: &RegionStores) -> Result<()> {
    let now = Utc::now();
    let region = stores.region();
    println!(
        "Region {} (zone {}, {})",
        region.name, region.bidding_zone, region.timezone
    );
    for store in stores.stores() {
        let core = store.core();
        println!("{}", store.kind());
        println!("  rows:       {}", core.len());
        println!("  first:      {}", format_opt(core.first_known()));
        println!("  last:       {}", format_opt(core.last_known()));
        println!("  revalidate: {}", store.next_revalidation_time(now).to_rfc3339());
        match core.snapshot_path() {
            Some(path) if path.exists() => println!("  snapshot:   {}", path.display()),
            Some(path) => println!("  snapshot:   {} (not written yet)", path.display()),
            None => println!("  snapshot:   in memory"),
        }
    }
    Ok(())
}

fn run_export(
    stores: &RegionStores,
    kind: StoreKind,
    start: &str,
    end: &str,
    output: &Path,
    fetch: bool,
) -> Result<()> {
    let start = parse_instant(start)?;
    let end = parse_instant(end)?;
    if start > end {
        bail!("--start must not be after --end");
    }

    let store = stores.store(kind);
    let frame = if fetch {
        store.get(start, end)
    } else {
        store.get_known(start, end)
    };
    write_csv(&frame, output)?;
    println!("Wrote {} {kind} rows to {}", frame.len(), output.display());
    Ok(())
}

fn run_watch(stores: RegionStores, cycles: Option<u32>) -> Result<()> {
    let coordinator = WarmCoordinator::new(Arc::new(stores));
    let mut done = 0;
    loop {
        coordinator.ensure_warm(Utc::now());
        coordinator.wait_idle();
        done += 1;
        if cycles.is_some_and(|max| done >= max) {
            return Ok(());
        }

        let now = Utc::now();
        let next = coordinator.target().next_revalidation_time(now);
        let wait = (next - now)
            .to_std()
            .unwrap_or_default()
            .max(std::time::Duration::from_secs(1));
        info!(next = %next.to_rfc3339(), "sleeping until next revalidation");
        std::thread::sleep(wait);
    }
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid time '{raw}', expected RFC 3339 or YYYY-MM-DD"))?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

fn write_csv(frame: &Frame, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    let mut header = vec!["time".to_string()];
    header.extend(frame.columns().iter().cloned());
    writer.write_record(&header)?;

    for row in frame.rows() {
        let mut record = Vec::with_capacity(row.values.len() + 1);
        record.push(row.time.to_rfc3339());
        record.extend(row.values.iter().map(|v| {
            if v.is_nan() {
                String::new()
            } else {
                v.to_string()
            }
        }));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn format_opt(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_dates_and_timestamps() {
        assert_eq!(
            parse_instant("2025-01-02").unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_instant("2025-01-02T13:00:00+01:00").unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 2, 12, 0, 0).unwrap()
        );
        assert!(parse_instant("yesterday").is_err());
    }

    #[test]
    fn csv_leaves_unknown_fields_blank() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut frame = Frame::new(["price", "wind_0"]);
        frame.push(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(), vec![12.5, f64::NAN]);

        write_csv(&frame, &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "time,price,wind_0");
        assert_eq!(lines[1], "2025-01-01T00:00:00+00:00,12.5,");
    }
}
