//! Snapshot file loading.
//!
//! Missing or unparsable JSON files are fatal; individual malformed peer
//! entries are skipped with a warning so one bad record cannot sink a whole
//! run. Only the observation timestamp degrades softly, since the table
//! builder can reconstruct it from the event log.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

use color_eyre::eyre::{Context, Result};

use super::types::{CustomMetrics, GossipPeer, PeerstoreEntry};

/// Load the peerstore JSON (peer id -> identify data).
pub fn load_peerstore(path: &Path) -> Result<HashMap<String, PeerstoreEntry>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read peerstore from {}", path.display()))?;

    let values: HashMap<String, serde_json::Value> =
        serde_json::from_str(&content).context("Failed to parse peerstore JSON")?;

    let mut entries = HashMap::with_capacity(values.len());
    let mut skipped = 0;
    for (peer_id, value) in values {
        match serde_json::from_value::<PeerstoreEntry>(value) {
            Ok(entry) => {
                entries.insert(peer_id, entry);
            }
            Err(err) => {
                log::warn!("skipping malformed peerstore entry {}: {}", peer_id, err);
                skipped += 1;
            }
        }
    }
    if skipped > 0 {
        log::warn!("skipped {} malformed peerstore entries", skipped);
    }

    log::info!("loaded {} peerstore entries", entries.len());
    Ok(entries)
}

/// Load the gossip-metrics JSON (peer id -> connection/message telemetry).
pub fn load_gossip_peers(path: &Path) -> Result<Vec<GossipPeer>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read gossip metrics from {}", path.display()))?;

    let values: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&content).context("Failed to parse gossip metrics JSON")?;

    let mut peers = Vec::with_capacity(values.len());
    let mut skipped = 0;
    for (peer_id, value) in values {
        match serde_json::from_value::<GossipPeer>(value) {
            Ok(mut peer) => {
                // The map key is authoritative when the embedded id is blank.
                if peer.peer_id.is_empty() {
                    peer.peer_id = peer_id;
                }
                peers.push(peer);
            }
            Err(err) => {
                log::warn!("skipping malformed gossip peer {}: {}", peer_id, err);
                skipped += 1;
            }
        }
    }
    if skipped > 0 {
        log::warn!("skipped {} malformed gossip peers", skipped);
    }

    log::info!("loaded {} gossip peers", peers.len());
    Ok(peers)
}

/// Load the custom-metrics JSON, returning both the typed clock and the raw
/// value (the progression overview re-exports the raw documents).
pub fn load_custom_metrics(path: &Path) -> Result<(CustomMetrics, serde_json::Value)> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read custom metrics from {}", path.display()))?;

    let raw: serde_json::Value =
        serde_json::from_str(&content).context("Failed to parse custom metrics JSON")?;
    let typed: CustomMetrics = serde_json::from_value(raw.clone())
        .context("Failed to decode custom metrics structure")?;

    Ok((typed, raw))
}

/// Snapshot observation time in milliseconds: the gossip-metrics file's
/// modification time, the same convention the crawler's own tooling used.
///
/// None when the file cannot be stat'd or carries a pre-epoch mtime; the
/// table builder then falls back to the last event timestamp seen.
pub fn snapshot_observed_at(path: &Path) -> Option<i64> {
    let modified = match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(err) => {
            log::warn!("failed to stat {}: {}", path.display(), err);
            return None;
        }
    };
    match modified.duration_since(UNIX_EPOCH) {
        Ok(duration) => Some(duration.as_millis() as i64),
        Err(_) => {
            log::warn!("{} has a pre-epoch modification time", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_peerstore_skips_malformed_entries() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "peerA": {{"user_agent": "teku/v21.1.0", "latency": 12000000, "addrs": ["/ip4/1.2.3.4/tcp/9000"]}},
                "peerB": "not-an-object"
            }}"#
        )
        .unwrap();

        let entries = load_peerstore(file.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries["peerA"].user_agent.as_deref(),
            Some("teku/v21.1.0")
        );
    }

    #[test]
    fn test_load_gossip_peers_takes_map_key_as_id() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"16Uiu2Peer": {{"NodeId": "abcd", "Ip": "1.2.3.4"}}}}"#
        )
        .unwrap();

        let peers = load_gossip_peers(file.path()).unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].peer_id, "16Uiu2Peer");
        assert_eq!(peers[0].node_id, "abcd");
        assert!(peers[0].connection_events.is_empty());
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let missing = Path::new("/nonexistent/gossip-metrics.json");
        assert!(load_gossip_peers(missing).is_err());
        assert!(load_peerstore(missing).is_err());
    }

    #[test]
    fn test_observed_at_from_file_mtime() {
        let file = NamedTempFile::new().unwrap();
        let millis = snapshot_observed_at(file.path()).unwrap();
        assert!(millis > 0);
    }

    #[test]
    fn test_observed_at_none_for_missing_file() {
        assert!(snapshot_observed_at(Path::new("/nonexistent/gossip-metrics.json")).is_none());
    }

    #[test]
    fn test_custom_metrics_clock() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"StopTime": {{"Year": 2021, "Month": 3, "Day": 7, "Hour": 9, "Minute": 5}}}}"#
        )
        .unwrap();

        let (metrics, raw) = load_custom_metrics(file.path()).unwrap();
        assert_eq!(metrics.stop_time.date_label(), "2021/03/07");
        assert!(raw.get("StopTime").is_some());
    }
}
