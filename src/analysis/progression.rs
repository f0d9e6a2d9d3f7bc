//! Multi-day crawler progression overview.
//!
//! Walks a directory of per-day snapshot folders and tracks how the client
//! distribution evolved: the observed share among metadata-requested peers,
//! and an estimated share that corrects for Prysm's habit of answering
//! identify requests poorly by counting peerstore entries advertising
//! Prysm's default port 13000.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, Result};
use serde::Serialize;

use super::client::{classify, ClientFamily};
use crate::snapshot::{self, PeerstoreEntry};

/// Client share percentages for one snapshot day, aligned with
/// [`ClientFamily::ALL`].
#[derive(Debug, Clone, Serialize)]
pub struct DistributionRow {
    pub date: String,
    pub shares: [f64; 6],
}

/// Full progression over a directory of daily snapshots.
#[derive(Debug, Default, Serialize)]
pub struct ProgressionReport {
    pub observed: Vec<DistributionRow>,
    pub estimated: Vec<DistributionRow>,
    /// Raw custom-metrics documents, concatenated for downstream tooling.
    pub custom_metrics: Vec<serde_json::Value>,
}

/// Default TCP port Prysm listens on; used for the estimation heuristic.
const PRYSM_PORT_FRAGMENT: &str = "/13000";

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Per-family counts among metadata-requested peers of one gossip snapshot.
fn observed_counts(gossip_path: &Path) -> Result<(HashMap<ClientFamily, u64>, u64)> {
    let peers = snapshot::load_gossip_peers(gossip_path)?;

    let mut counts: HashMap<ClientFamily, u64> = HashMap::new();
    let mut requested = 0;
    for peer in &peers {
        if !peer.metadata_request {
            continue;
        }
        requested += 1;
        let family = classify(&peer.client_type).family;
        *counts.entry(family).or_default() += 1;
    }
    Ok((counts, requested))
}

fn observed_row(
    counts: &HashMap<ClientFamily, u64>,
    requested: u64,
    date: String,
) -> DistributionRow {
    let mut shares = [0.0; 6];
    for (i, family) in ClientFamily::ALL.iter().enumerate() {
        let count = counts.get(family).copied().unwrap_or(0);
        shares[i] = round_to(count as f64 * 100.0 / requested as f64, 3);
    }
    DistributionRow { date, shares }
}

/// Estimated distribution: Prysm's share comes from peerstore entries whose
/// first advertised address carries port 13000; the remainder is split
/// proportionally to the observed non-Prysm counts.
fn estimated_row(
    counts: &HashMap<ClientFamily, u64>,
    peerstore: &HashMap<String, PeerstoreEntry>,
    date: String,
) -> Option<DistributionRow> {
    let total = peerstore.len() as f64;
    let prysm_like = peerstore
        .values()
        .filter(|entry| {
            entry
                .addrs
                .first()
                .map(|addr| addr.contains(PRYSM_PORT_FRAGMENT))
                .unwrap_or(false)
        })
        .count() as f64;

    let non_prysm_observed: u64 = ClientFamily::ALL
        .iter()
        .filter(|f| **f != ClientFamily::Prysm)
        .map(|f| counts.get(f).copied().unwrap_or(0))
        .sum();
    if total == 0.0 || non_prysm_observed == 0 {
        return None;
    }

    let rest = total - prysm_like;
    let mut shares = [0.0; 6];
    for (i, family) in ClientFamily::ALL.iter().enumerate() {
        shares[i] = if *family == ClientFamily::Prysm {
            round_to(prysm_like * 100.0 / total, 2)
        } else {
            let observed = counts.get(family).copied().unwrap_or(0) as f64;
            let estimated = rest * observed / non_prysm_observed as f64;
            round_to(estimated * 100.0 / total, 2)
        };
    }
    Some(DistributionRow { date, shares })
}

/// Snapshot folders inside `projects_dir`, sorted by name (the crawler
/// names them by date, so lexical order is chronological order).
fn snapshot_dirs(projects_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(projects_dir)
        .with_context(|| format!("Failed to read {}", projects_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Build the progression report over every complete snapshot folder.
///
/// Folders missing any of the three snapshot files are skipped with a
/// warning; days with no metadata-requested peers are skipped entirely,
/// matching the original overview script.
pub fn scan_progression(projects_dir: &Path) -> Result<ProgressionReport> {
    let mut report = ProgressionReport::default();

    for dir in snapshot_dirs(projects_dir)? {
        let gossip_path = dir.join("gossip-metrics.json");
        let custom_path = dir.join("custom-metrics.json");
        let peerstore_path = dir.join("peerstore.json");
        if !gossip_path.exists() || !custom_path.exists() || !peerstore_path.exists() {
            log::warn!("skipping incomplete snapshot folder {}", dir.display());
            continue;
        }

        let (custom, raw_custom) = snapshot::load_custom_metrics(&custom_path)?;
        let date = custom.stop_time.date_label();

        let (counts, requested) = observed_counts(&gossip_path)?;
        if requested == 0 {
            log::warn!(
                "no metadata-requested peers in {}, skipping",
                dir.display()
            );
            continue;
        }

        let peerstore = snapshot::load_peerstore(&peerstore_path)?;

        report
            .observed
            .push(observed_row(&counts, requested, date.clone()));
        if let Some(row) = estimated_row(&counts, &peerstore, date) {
            report.estimated.push(row);
        }
        report.custom_metrics.push(raw_custom);
    }

    // Lexical folder order already sorted the rows, but snapshots taken the
    // same day keep their StopTime order.
    report.observed.sort_by(|a, b| a.date.cmp(&b.date));
    report.estimated.sort_by(|a, b| a.date.cmp(&b.date));

    log::info!(
        "progression over {} observed / {} estimated days",
        report.observed.len(),
        report.estimated.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(ClientFamily, u64)]) -> HashMap<ClientFamily, u64> {
        pairs.iter().copied().collect()
    }

    fn store_entry(first_addr: &str) -> PeerstoreEntry {
        PeerstoreEntry {
            user_agent: None,
            latency: None,
            addrs: vec![first_addr.to_string()],
        }
    }

    #[test]
    fn test_observed_shares_sum_to_hundred() {
        let counts = counts(&[
            (ClientFamily::Lighthouse, 3),
            (ClientFamily::Teku, 1),
            (ClientFamily::Unknown, 1),
        ]);
        let row = observed_row(&counts, 5, "2021/03/07".to_string());
        assert_eq!(row.shares[0], 60.0);
        assert_eq!(row.shares[1], 20.0);
        assert_eq!(row.shares[5], 20.0);
        let total: f64 = row.shares.iter().sum();
        assert!((total - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_estimated_prysm_share_from_port_heuristic() {
        let observed = counts(&[
            (ClientFamily::Lighthouse, 2),
            (ClientFamily::Teku, 2),
        ]);
        let mut peerstore = HashMap::new();
        for i in 0..6 {
            peerstore.insert(
                format!("prysm-{}", i),
                store_entry("/ip4/84.10.0.1/tcp/13000"),
            );
        }
        for i in 0..4 {
            peerstore.insert(format!("other-{}", i), store_entry("/ip4/84.10.0.2/tcp/9000"));
        }

        let row = estimated_row(&observed, &peerstore, "2021/03/07".to_string()).unwrap();
        // 6 of 10 peers advertise port 13000.
        assert_eq!(row.shares[3], 60.0);
        // The remaining 40% splits evenly between Lighthouse and Teku.
        assert_eq!(row.shares[0], 20.0);
        assert_eq!(row.shares[1], 20.0);
    }

    #[test]
    fn test_estimation_skipped_when_no_observed_non_prysm() {
        let observed = counts(&[(ClientFamily::Prysm, 4)]);
        let mut peerstore = HashMap::new();
        peerstore.insert("p".to_string(), store_entry("/ip4/84.10.0.1/tcp/13000"));
        assert!(estimated_row(&observed, &peerstore, "d".to_string()).is_none());
    }

    #[test]
    fn test_estimation_skipped_for_empty_peerstore() {
        let observed = counts(&[(ClientFamily::Teku, 1)]);
        let peerstore = HashMap::new();
        assert!(estimated_row(&observed, &peerstore, "d".to_string()).is_none());
    }
}
