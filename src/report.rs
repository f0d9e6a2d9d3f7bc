//! Report generation: summary JSON/text output and the full figure battery.

use std::fs;
use std::path::Path;

use color_eyre::eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::aggregate::{aggregate, distinct_values, AggregateMode};
use crate::analysis::client::ClientFamily;
use crate::analysis::progression::ProgressionReport;
use crate::charts::{self, bar_chart, pie_chart, stacked_area_chart, ChartOptions};
use crate::table::PeerTable;

/// Headline numbers for a single snapshot analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub generated_at: String,
    pub peerstore_size: usize,
    pub connected_peers: usize,
    /// First and last connection-event timestamps seen, in epoch millis.
    pub first_event_millis: Option<i64>,
    pub last_event_millis: Option<i64>,
    pub peers_per_client: Vec<ClientCount>,
    pub total_connections: u64,
    pub total_disconnections: u64,
    pub countries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCount {
    pub client: String,
    pub peers: f64,
}

/// Build the summary from a finished peer table.
pub fn build_summary(table: &PeerTable) -> AnalysisSummary {
    let labels = charts::family_labels();
    let per_client = aggregate(
        &table.records,
        "ClientFamily",
        "ClientFamily",
        &labels,
        AggregateMode::Count,
    );
    let peers_per_client = labels
        .iter()
        .zip(per_client.iter())
        .map(|(client, peers)| ClientCount {
            client: client.clone(),
            peers: *peers,
        })
        .collect();

    AnalysisSummary {
        generated_at: chrono::Utc::now().to_rfc3339(),
        peerstore_size: table.peerstore_size,
        connected_peers: table.records.iter().filter(|r| r.connections > 0).count(),
        first_event_millis: table.bounds.first_millis(),
        last_event_millis: table.bounds.last_millis(),
        peers_per_client,
        total_connections: table.records.iter().map(|r| r.connections).sum(),
        total_disconnections: table.records.iter().map(|r| r.disconnections).sum(),
        countries: distinct_values(&table.records, "Country").len(),
    }
}

/// Write the summary as pretty-printed JSON.
pub fn write_json_summary(summary: &AnalysisSummary, output_path: &Path) -> Result<()> {
    let json =
        serde_json::to_string_pretty(summary).context("Failed to serialize summary to JSON")?;
    fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON summary to {}", output_path.display()))?;
    log::info!("JSON summary written to {}", output_path.display());
    Ok(())
}

/// Print the summary to stdout in a readable layout.
pub fn print_summary(summary: &AnalysisSummary) {
    println!("{}", "=".repeat(70));
    println!("                    PEER NETWORK ANALYSIS");
    println!("{}", "=".repeat(70));
    println!();
    println!("Generated: {}", summary.generated_at);
    println!("Peerstore size: {}", summary.peerstore_size);
    println!("Peers with at least one connection: {}", summary.connected_peers);
    println!("Countries observed: {}", summary.countries);
    if let (Some(first), Some(last)) = (summary.first_event_millis, summary.last_event_millis) {
        println!("Event window: {} .. {} (epoch ms)", first, last);
    }
    println!();
    println!("Peers per client:");
    for entry in &summary.peers_per_client {
        println!("  {:<12} {}", entry.client, entry.peers);
    }
    println!();
    println!(
        "Connection events: {} connections / {} disconnections",
        summary.total_connections, summary.total_disconnections
    );
}

fn plain_options(title: &str, y_label: &str) -> ChartOptions {
    ChartOptions {
        title: title.to_string(),
        y_label: Some(y_label.to_string()),
        colors: vec!["#4c72b0".to_string()],
    }
}

/// Truncated peer ids keep the per-peer bar axes readable. Truncation is
/// by character, not byte, since peer ids arrive unvalidated from JSON or
/// reloaded CSV and may carry multi-byte characters.
fn short_peer_ids(table: &PeerTable) -> Vec<String> {
    table
        .records
        .iter()
        .map(|r| {
            let chars: Vec<char> = r.peer_id.chars().collect();
            let start = chars.len().saturating_sub(8);
            chars[start..].iter().collect()
        })
        .collect()
}

/// Render the full set of snapshot figures into `figs_dir`.
pub fn render_chart_battery(table: &PeerTable, figs_dir: &Path) -> Result<()> {
    fs::create_dir_all(figs_dir)
        .with_context(|| format!("Failed to create figures dir {}", figs_dir.display()))?;

    let family_labels = charts::family_labels();

    // Peerstore vs peers we actually connected.
    let connected = table.records.iter().filter(|r| r.connections > 0).count();
    bar_chart(
        &figs_dir.join("PeerstoreVsConnectedPeers.svg"),
        &plain_options("Peerstore vs Connected Peers", "Peers"),
        &["Peerstore".to_string(), "Connected".to_string()],
        &[table.peerstore_size as f64, connected as f64],
    )?;

    // Client distribution.
    let per_client = aggregate(
        &table.records,
        "ClientFamily",
        "ClientFamily",
        &family_labels,
        AggregateMode::Count,
    );
    pie_chart(
        &figs_dir.join("PeersPerClient.svg"),
        &charts::family_chart_options("Peers per Client", "Peers"),
        &family_labels,
        &per_client,
    )?;

    // Country distribution.
    let countries = distinct_values(&table.records, "Country");
    let per_country = aggregate(
        &table.records,
        "Country",
        "Country",
        &countries,
        AggregateMode::Count,
    );
    bar_chart(
        &figs_dir.join("PeersPerCountries.svg"),
        &plain_options("Peers per Country", "Peers"),
        &countries,
        &per_country,
    )?;

    // Per-family session averages.
    let family_averages = [
        ("Connections", "AverageOfConnectionsPerClientType"),
        ("Disconnections", "AverageOfDisconnectionsPerClientType"),
        ("ConnectedTime", "AverageOfConnectedTimePerClientType"),
    ];
    for (column, stem) in family_averages {
        let values = aggregate(
            &table.records,
            column,
            "ClientFamily",
            &family_labels,
            AggregateMode::Average,
        );
        let y_label = if column == "ConnectedTime" { "Minutes" } else { "Events" };
        bar_chart(
            &figs_dir.join(format!("{stem}.svg")),
            &charts::family_chart_options(&format!("Average {column} per Client"), y_label),
            &family_labels,
            &values,
        )?;
    }

    // Gossip message totals and per-peer averages, one pair per topic.
    let topics = [
        "BeaconBlock",
        "BeaconAggregateProof",
        "VoluntaryExit",
        "AttesterSlashing",
        "ProposerSlashing",
    ];
    for topic in topics {
        let column = format!("{topic}Cnt");
        let totals = aggregate(
            &table.records,
            &column,
            "ClientFamily",
            &family_labels,
            AggregateMode::Sum,
        );
        bar_chart(
            &figs_dir.join(format!("MessagesFrom{topic}.svg")),
            &charts::family_chart_options(&format!("{topic} Messages per Client"), "Messages"),
            &family_labels,
            &totals,
        )?;
        let averages = aggregate(
            &table.records,
            &column,
            "ClientFamily",
            &family_labels,
            AggregateMode::Average,
        );
        bar_chart(
            &figs_dir.join(format!("MessagesAverageFrom{topic}.svg")),
            &charts::family_chart_options(
                &format!("Average {topic} Messages per Peer"),
                "Messages",
            ),
            &family_labels,
            &averages,
        )?;
    }

    // Per-peer bars, one bar per table row.
    let peer_ids = short_peer_ids(table);
    let per_peer: [(&str, &str, fn(&crate::table::PeerRecord) -> f64); 4] = [
        ("ConnectionsWithPeers", "Connections", |r| r.connections as f64),
        ("DisconnectionsWithPeers", "Disconnections", |r| {
            r.disconnections as f64
        }),
        ("TimeConnectedWithPeers", "Minutes", |r| r.connected_minutes),
        ("LatencyWithPeers", "Seconds", |r| r.latency_secs.unwrap_or(0.0)),
    ];
    for (stem, y_label, extract) in per_peer {
        let values: Vec<f64> = table.records.iter().map(extract).collect();
        bar_chart(
            &figs_dir.join(format!("{stem}.svg")),
            &plain_options(stem, y_label),
            &peer_ids,
            &values,
        )?;
    }

    log::info!("Figures written to {}", figs_dir.display());
    Ok(())
}

/// Render the observed and estimated client-distribution progressions.
pub fn render_progression_charts(report: &ProgressionReport, out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output dir {}", out_dir.display()))?;

    let family_labels: Vec<&str> = ClientFamily::ALL.iter().map(|f| f.label()).collect();
    let charts = [
        ("ObservedClientDistribution.svg", "Observed Client Distribution (%)", &report.observed),
        (
            "EstimatedClientDistribution.svg",
            "Estimated Client Distribution (%)",
            &report.estimated,
        ),
    ];
    for (stem, title, rows) in charts {
        let dates: Vec<String> = rows.iter().map(|r| r.date.clone()).collect();
        let series: Vec<Vec<f64>> = (0..ClientFamily::ALL.len())
            .map(|i| rows.iter().map(|r| r.shares[i]).collect())
            .collect();
        stacked_area_chart(
            &out_dir.join(stem),
            &charts::family_chart_options(title, "Share (%)"),
            &dates,
            &family_labels,
            &series,
        )?;
    }

    log::info!("Progression charts written to {}", out_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{MessageCounts, PeerRecord};

    fn record(peer_id: &str, family: ClientFamily, country: &str, connections: u64) -> PeerRecord {
        PeerRecord {
            peer_id: peer_id.to_string(),
            node_id: String::new(),
            user_agent: family.label().to_string(),
            pubkey: String::new(),
            addrs: Vec::new(),
            ip: String::new(),
            country: country.to_string(),
            city: "Unknown".to_string(),
            latency_secs: None,
            family,
            version: String::new(),
            connections,
            disconnections: connections,
            connected_minutes: 1.0,
            messages: MessageCounts::default(),
            metadata_requested: false,
        }
    }

    fn sample_table() -> PeerTable {
        PeerTable {
            records: vec![
                record("16Uiu2peerAAAA", ClientFamily::Teku, "Germany", 2),
                record("16Uiu2peerBBBB", ClientFamily::Prysm, "Germany", 0),
                record("16Uiu2peerCCCC", ClientFamily::Prysm, "Spain", 1),
            ],
            bounds: Default::default(),
            peerstore_size: 10,
        }
    }

    #[test]
    fn test_summary_counts() {
        let summary = build_summary(&sample_table());
        assert_eq!(summary.peerstore_size, 10);
        assert_eq!(summary.connected_peers, 2);
        assert_eq!(summary.total_connections, 3);
        assert_eq!(summary.countries, 2);
        let prysm = summary
            .peers_per_client
            .iter()
            .find(|c| c.client == "Prysm")
            .unwrap();
        assert_eq!(prysm.peers, 2.0);
    }

    #[test]
    fn test_json_summary_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let summary = build_summary(&sample_table());
        write_json_summary(&summary, &path).unwrap();
        let loaded: AnalysisSummary =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.peerstore_size, summary.peerstore_size);
        assert_eq!(loaded.peers_per_client.len(), summary.peers_per_client.len());
    }

    #[test]
    fn test_short_peer_ids_truncate_on_characters() {
        let mut table = sample_table();
        table.records[0].peer_id = "peer-αβγδεζηθικ".to_string();
        table.records[1].peer_id = "abc".to_string();
        let ids = short_peer_ids(&table);
        assert_eq!(ids[0], "γδεζηθικ");
        assert_eq!(ids[1], "abc");
    }

    #[test]
    fn test_chart_battery_handles_multibyte_peer_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = sample_table();
        // 4 characters but 12 bytes; byte-offset truncation would split a
        // character here.
        table.records[0].peer_id = "€€€€".to_string();
        table.records[1].peer_id = "узел-идентификатор".to_string();
        render_chart_battery(&table, dir.path()).unwrap();
        assert!(dir.path().join("ConnectionsWithPeers.svg").exists());
    }

    #[test]
    fn test_chart_battery_writes_expected_files() {
        let dir = tempfile::tempdir().unwrap();
        render_chart_battery(&sample_table(), dir.path()).unwrap();
        for stem in [
            "PeerstoreVsConnectedPeers",
            "PeersPerClient",
            "PeersPerCountries",
            "AverageOfConnectionsPerClientType",
            "MessagesFromBeaconBlock",
            "MessagesAverageFromVoluntaryExit",
            "ConnectionsWithPeers",
            "LatencyWithPeers",
        ] {
            assert!(dir.path().join(format!("{stem}.svg")).exists(), "{stem} missing");
        }
    }
}
