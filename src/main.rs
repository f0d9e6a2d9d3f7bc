//! Snapshot analysis CLI for discovery-crawler exports.
//!
//! Joins a crawler's peerstore and gossip-metrics JSON files into a peer
//! table, renders the figure battery, and tracks client distribution
//! across multi-day crawls.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result};

use peerscope::analysis::progression;
use peerscope::geo::{GeoResolver, IpApiResolver, NullResolver};
use peerscope::report;
use peerscope::snapshot;
use peerscope::table::{build_table, PeerTable};

#[derive(Parser)]
#[command(name = "peerscope")]
#[command(about = "Offline analysis of consensus-layer crawler snapshots")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Skip IP geolocation lookups (locations become "Unknown")
    #[arg(long)]
    skip_geo: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one snapshot from its JSON exports
    Json {
        /// Path to the peerstore JSON file
        peerstore: PathBuf,

        /// Path to the gossip-metrics JSON file
        metrics: PathBuf,

        /// Directory to write figures into
        figs_dir: PathBuf,

        /// Path for the exported metrics CSV
        out_csv: PathBuf,

        /// Optional custom-metrics JSON, echoed into the summary output
        #[arg(long)]
        custom: Option<PathBuf>,
    },

    /// Re-render figures from a previously exported metrics CSV
    Csv {
        /// Path to the peerstore JSON file (for the peerstore size)
        peerstore: PathBuf,

        /// Path to the metrics CSV produced by the json command
        table_csv: PathBuf,

        /// Directory to write figures into
        figs_dir: PathBuf,
    },

    /// Client-distribution progression across a directory of daily snapshots
    Progression {
        /// Directory holding one snapshot folder per day
        projects_dir: PathBuf,

        /// Directory for progression charts and the report JSON
        out_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    match cli.command {
        Commands::Json {
            peerstore,
            metrics,
            figs_dir,
            out_csv,
            custom,
        } => {
            let resolver = cli_resolver(cli.skip_geo)?;
            run_json(resolver.as_ref(), &peerstore, &metrics, &figs_dir, &out_csv, custom.as_deref())
        }
        Commands::Csv {
            peerstore,
            table_csv,
            figs_dir,
        } => run_csv(&peerstore, &table_csv, &figs_dir),
        Commands::Progression { projects_dir, out_dir } => run_progression(&projects_dir, &out_dir),
    }
}

fn cli_resolver(skip_geo: bool) -> Result<Box<dyn GeoResolver>> {
    if skip_geo {
        log::info!("geolocation disabled, all locations will be Unknown");
        Ok(Box::new(NullResolver))
    } else {
        Ok(Box::new(IpApiResolver::new()?))
    }
}

fn run_json(
    resolver: &dyn GeoResolver,
    peerstore_path: &Path,
    metrics_path: &Path,
    figs_dir: &Path,
    out_csv: &Path,
    custom: Option<&Path>,
) -> Result<()> {
    log::info!("loading snapshot from {}", metrics_path.display());
    let peerstore = snapshot::load_peerstore(peerstore_path)?;
    let gossip_peers = snapshot::load_gossip_peers(metrics_path)?;
    let observed_at = snapshot::snapshot_observed_at(metrics_path);

    let table = build_table(&peerstore, &gossip_peers, observed_at, resolver);
    log::info!(
        "built table with {} peers ({} in peerstore)",
        table.records.len(),
        table.peerstore_size
    );

    table.to_csv(out_csv)?;
    log::info!("metrics CSV written to {}", out_csv.display());

    report::render_chart_battery(&table, figs_dir)?;

    let summary = report::build_summary(&table);
    report::write_json_summary(&summary, &figs_dir.join("summary.json"))?;
    report::print_summary(&summary);

    if let Some(custom_path) = custom {
        let (metrics, _) = snapshot::load_custom_metrics(custom_path)?;
        println!();
        println!("Crawl window: {} .. {}", metrics.start_time.date_label(), metrics.stop_time.date_label());
    }

    Ok(())
}

fn run_csv(
    peerstore_path: &Path,
    table_csv: &Path,
    figs_dir: &Path,
) -> Result<()> {
    let peerstore = snapshot::load_peerstore(peerstore_path)?;
    let table = PeerTable::from_csv(table_csv, peerstore.len())
        .with_context(|| format!("Failed to reload table from {}", table_csv.display()))?;
    log::info!("reloaded {} peers from {}", table.records.len(), table_csv.display());

    report::render_chart_battery(&table, figs_dir)?;

    let summary = report::build_summary(&table);
    report::write_json_summary(&summary, &figs_dir.join("summary.json"))?;
    report::print_summary(&summary);

    Ok(())
}

fn run_progression(projects_dir: &Path, out_dir: &Path) -> Result<()> {
    let progression_report = progression::scan_progression(projects_dir)?;
    log::info!(
        "progression covers {} observed / {} estimated days",
        progression_report.observed.len(),
        progression_report.estimated.len()
    );

    report::render_progression_charts(&progression_report, out_dir)?;

    let json = serde_json::to_string_pretty(&progression_report)
        .context("Failed to serialize progression report")?;
    let report_path = out_dir.join("progression.json");
    std::fs::write(&report_path, json)
        .with_context(|| format!("Failed to write {}", report_path.display()))?;
    log::info!("progression report written to {}", report_path.display());

    Ok(())
}
