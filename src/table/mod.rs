//! Per-peer metrics table: the join of peerstore and gossip snapshots,
//! with coalesced sessions, classified clients, and resolved locations.
//!
//! The table is built once per analysis run, exported to CSV, and consumed
//! by the aggregator and chart battery. A CSV export can be reloaded to
//! re-render charts without the original snapshot files.

use std::collections::HashMap;
use std::path::Path;

use color_eyre::eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::client::{classify, ClientFamily};
use crate::analysis::events::{coalesce_events, TimeBounds};
use crate::geo::{resolve_peer_location, GeoResolver};
use crate::snapshot::{GossipPeer, PeerstoreEntry};

/// Per-gossip-topic message counters for one peer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MessageCounts {
    pub beacon_block: u64,
    pub beacon_aggregate_proof: u64,
    pub voluntary_exit: u64,
    pub proposer_slashing: u64,
    pub attester_slashing: u64,
}

/// One row of the metrics table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerRecord {
    pub peer_id: String,
    pub node_id: String,
    /// Raw user agent as reported over identify; "Unknown" when the
    /// peerstore had none.
    pub user_agent: String,
    pub pubkey: String,
    pub addrs: Vec<String>,
    pub ip: String,
    pub country: String,
    pub city: String,
    /// Identify latency in seconds; absent when never measured.
    pub latency_secs: Option<f64>,
    pub family: ClientFamily,
    pub version: String,
    pub connections: u64,
    pub disconnections: u64,
    pub connected_minutes: f64,
    pub messages: MessageCounts,
    pub metadata_requested: bool,
}

/// CSV column set, mirroring the crawler's original export plus the
/// classified family/version pair.
pub const COLUMNS: [&str; 19] = [
    "PeerId",
    "NodeId",
    "ClientType",
    "ClientFamily",
    "ClientVersion",
    "Pubkey",
    "Addrs",
    "Ip",
    "Country",
    "City",
    "Latency",
    "Connections",
    "Disconnections",
    "ConnectedTime",
    "BeaconBlockCnt",
    "BeaconAggregateProofCnt",
    "VoluntaryExitCnt",
    "ProposerSlashingCnt",
    "AttesterSlashingCnt",
];

impl PeerRecord {
    /// Text view of a column, used for substring group matching.
    pub fn text_field(&self, column: &str) -> Option<String> {
        match column {
            "PeerId" => Some(self.peer_id.clone()),
            "NodeId" => Some(self.node_id.clone()),
            "ClientType" => Some(self.user_agent.clone()),
            "ClientFamily" => Some(self.family.label().to_string()),
            "ClientVersion" => Some(self.version.clone()),
            "Pubkey" => Some(self.pubkey.clone()),
            "Ip" => Some(self.ip.clone()),
            "Country" => Some(self.country.clone()),
            "City" => Some(self.city.clone()),
            _ => None,
        }
    }

    /// Numeric view of a column; None for non-numeric or absent values.
    pub fn numeric_field(&self, column: &str) -> Option<f64> {
        match column {
            "Latency" => self.latency_secs,
            "Connections" => Some(self.connections as f64),
            "Disconnections" => Some(self.disconnections as f64),
            "ConnectedTime" => Some(self.connected_minutes),
            "BeaconBlockCnt" => Some(self.messages.beacon_block as f64),
            "BeaconAggregateProofCnt" => Some(self.messages.beacon_aggregate_proof as f64),
            "VoluntaryExitCnt" => Some(self.messages.voluntary_exit as f64),
            "ProposerSlashingCnt" => Some(self.messages.proposer_slashing as f64),
            "AttesterSlashingCnt" => Some(self.messages.attester_slashing as f64),
            _ => None,
        }
    }
}

/// The assembled metrics table for one snapshot.
#[derive(Debug, Clone, Default)]
pub struct PeerTable {
    pub records: Vec<PeerRecord>,
    /// Min/max event timestamp seen across every peer's log.
    pub bounds: TimeBounds,
    /// Total number of peerstore entries (connected or not).
    pub peerstore_size: usize,
}

/// Build the metrics table from the two snapshot files.
///
/// Peers missing from the peerstore get "Unknown" user agents and no
/// latency; location resolution follows the private-address fallback in
/// [`resolve_peer_location`].
///
/// `observed_at` is the snapshot wall-clock in milliseconds, normally the
/// gossip file's mtime. When unavailable, the last event timestamp across
/// all peers stands in, so open sessions still get accounted up to the
/// newest observation.
pub fn build_table(
    peerstore: &HashMap<String, PeerstoreEntry>,
    gossip_peers: &[GossipPeer],
    observed_at: Option<i64>,
    resolver: &dyn GeoResolver,
) -> PeerTable {
    let observed_at = observed_at.unwrap_or_else(|| {
        let last = gossip_peers
            .iter()
            .flat_map(|p| p.events())
            .map(|e| e.time_millis)
            .max()
            .unwrap_or(0);
        log::warn!(
            "snapshot observation time unavailable, using last event timestamp {}",
            last
        );
        last
    });

    let mut table = PeerTable {
        records: Vec::with_capacity(gossip_peers.len()),
        bounds: TimeBounds::default(),
        peerstore_size: peerstore.len(),
    };

    for peer in gossip_peers {
        let store_entry = peerstore.get(&peer.peer_id);

        let user_agent = store_entry
            .and_then(|e| e.user_agent.clone())
            .unwrap_or_else(|| "Unknown".to_string());
        let latency_secs = store_entry
            .and_then(|e| e.latency)
            .map(|nanos| nanos / 1_000_000_000.0);

        let addrs = if !peer.addrs.is_empty() {
            peer.addrs.clone()
        } else {
            store_entry.map(|e| e.addrs.clone()).unwrap_or_default()
        };

        let (summary, peer_bounds) = coalesce_events(&peer.events(), observed_at);
        table.bounds.merge(&peer_bounds);

        let (country, city) =
            resolve_peer_location(resolver, &peer.ip, (&peer.country, &peer.city), &addrs);

        let classification = classify(&user_agent);
        log::debug!(
            "peer {} classified as {} {}",
            peer.peer_id,
            classification.family,
            classification.version
        );

        table.records.push(PeerRecord {
            peer_id: peer.peer_id.clone(),
            node_id: peer.node_id.clone(),
            user_agent,
            pubkey: peer.pubkey.clone(),
            addrs,
            ip: peer.ip.clone(),
            country,
            city,
            latency_secs,
            family: classification.family,
            version: classification.version,
            connections: summary.connections,
            disconnections: summary.disconnections,
            connected_minutes: summary.connected_minutes,
            messages: MessageCounts {
                beacon_block: peer.beacon_block.cnt,
                beacon_aggregate_proof: peer.beacon_aggregate_proof.cnt,
                voluntary_exit: peer.voluntary_exit.cnt,
                proposer_slashing: peer.proposer_slashing.cnt,
                attester_slashing: peer.attester_slashing.cnt,
            },
            metadata_requested: peer.metadata_request,
        });
    }

    table
}

impl PeerTable {
    /// Export the table to CSV. Fractional columns are rounded so a
    /// write/read cycle reproduces aggregations to one decimal place.
    pub fn to_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create CSV at {}", path.display()))?;

        writer
            .write_record(&COLUMNS)
            .context("Failed to write CSV header")?;

        for record in &self.records {
            let latency = record
                .latency_secs
                .map(|l| format!("{:.3}", l))
                .unwrap_or_default();
            writer
                .write_record(&[
                    record.peer_id.as_str(),
                    record.node_id.as_str(),
                    record.user_agent.as_str(),
                    record.family.label(),
                    record.version.as_str(),
                    record.pubkey.as_str(),
                    &record.addrs.join("|"),
                    record.ip.as_str(),
                    record.country.as_str(),
                    record.city.as_str(),
                    &latency,
                    &record.connections.to_string(),
                    &record.disconnections.to_string(),
                    &format!("{:.1}", record.connected_minutes),
                    &record.messages.beacon_block.to_string(),
                    &record.messages.beacon_aggregate_proof.to_string(),
                    &record.messages.voluntary_exit.to_string(),
                    &record.messages.proposer_slashing.to_string(),
                    &record.messages.attester_slashing.to_string(),
                ])
                .context("Failed to write CSV row")?;
        }

        writer.flush().context("Failed to flush CSV")?;
        log::info!(
            "wrote {} peer rows to {}",
            self.records.len(),
            path.display()
        );
        Ok(())
    }

    /// Reload a previously exported CSV. Only the columns the aggregator
    /// and charts consume are required; anything missing defaults.
    pub fn from_csv(path: &Path, peerstore_size: usize) -> Result<PeerTable> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open CSV at {}", path.display()))?;
        let headers = reader.headers().context("Failed to read CSV header")?.clone();

        let index = |name: &str| headers.iter().position(|h| h == name);
        let col = |row: &csv::StringRecord, idx: Option<usize>| -> String {
            idx.and_then(|i| row.get(i)).unwrap_or_default().to_string()
        };

        let idx_peer = index("PeerId");
        let idx_node = index("NodeId");
        let idx_client = index("ClientType");
        let idx_family = index("ClientFamily");
        let idx_version = index("ClientVersion");
        let idx_pubkey = index("Pubkey");
        let idx_addrs = index("Addrs");
        let idx_ip = index("Ip");
        let idx_country = index("Country");
        let idx_city = index("City");
        let idx_latency = index("Latency");
        let idx_conn = index("Connections");
        let idx_disc = index("Disconnections");
        let idx_time = index("ConnectedTime");
        let idx_bb = index("BeaconBlockCnt");
        let idx_bap = index("BeaconAggregateProofCnt");
        let idx_ve = index("VoluntaryExitCnt");
        let idx_ps = index("ProposerSlashingCnt");
        let idx_as = index("AttesterSlashingCnt");

        let mut table = PeerTable {
            records: Vec::new(),
            bounds: TimeBounds::default(),
            peerstore_size,
        };

        for row in reader.records() {
            let row = row.context("Failed to read CSV row")?;

            let user_agent = col(&row, idx_client);
            let family_label = col(&row, idx_family);
            let family = if family_label.is_empty() {
                classify(&user_agent).family
            } else {
                ClientFamily::from_label(&family_label)
            };

            table.records.push(PeerRecord {
                peer_id: col(&row, idx_peer),
                node_id: col(&row, idx_node),
                user_agent,
                pubkey: col(&row, idx_pubkey),
                addrs: col(&row, idx_addrs)
                    .split('|')
                    .filter(|a| !a.is_empty())
                    .map(str::to_string)
                    .collect(),
                ip: col(&row, idx_ip),
                country: col(&row, idx_country),
                city: col(&row, idx_city),
                latency_secs: col(&row, idx_latency).parse::<f64>().ok(),
                family,
                version: col(&row, idx_version),
                connections: col(&row, idx_conn).parse().unwrap_or(0),
                disconnections: col(&row, idx_disc).parse().unwrap_or(0),
                connected_minutes: col(&row, idx_time).parse().unwrap_or(0.0),
                messages: MessageCounts {
                    beacon_block: col(&row, idx_bb).parse().unwrap_or(0),
                    beacon_aggregate_proof: col(&row, idx_bap).parse().unwrap_or(0),
                    voluntary_exit: col(&row, idx_ve).parse().unwrap_or(0),
                    proposer_slashing: col(&row, idx_ps).parse().unwrap_or(0),
                    attester_slashing: col(&row, idx_as).parse().unwrap_or(0),
                },
                metadata_requested: false,
            });
        }

        log::info!(
            "loaded {} peer rows from {}",
            table.records.len(),
            path.display()
        );
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::NullResolver;
    use crate::snapshot::RawConnectionEvent;

    fn gossip_peer(id: &str, ip: &str, events: Vec<(&str, i64)>) -> GossipPeer {
        GossipPeer {
            peer_id: id.to_string(),
            node_id: format!("node-{}", id),
            ip: ip.to_string(),
            country: "Germany".to_string(),
            city: "Berlin".to_string(),
            connection_events: events
                .into_iter()
                .map(|(t, ms)| RawConnectionEvent {
                    connection_type: t.to_string(),
                    time_mili: ms,
                })
                .collect(),
            ..GossipPeer::default()
        }
    }

    #[test]
    fn test_build_joins_peerstore_fields() {
        let mut peerstore = HashMap::new();
        peerstore.insert(
            "p1".to_string(),
            PeerstoreEntry {
                user_agent: Some("Prysm/v1.1.0/9b367b".to_string()),
                latency: Some(250_000_000.0),
                addrs: vec![],
            },
        );
        let peers = vec![gossip_peer(
            "p1",
            "84.10.0.1",
            vec![("Connection", 0), ("Disconnection", 120_000)],
        )];

        let table = build_table(&peerstore, &peers, Some(300_000), &NullResolver);
        assert_eq!(table.records.len(), 1);
        let rec = &table.records[0];
        assert_eq!(rec.family, ClientFamily::Prysm);
        assert_eq!(rec.version, "v1.1.0");
        assert_eq!(rec.latency_secs, Some(0.25));
        assert_eq!(rec.connections, 1);
        assert!((rec.connected_minutes - 2.0).abs() < 1e-9);
        assert_eq!(rec.country, "Germany");
        assert_eq!(table.bounds.first_millis(), Some(0));
        assert_eq!(table.bounds.last_millis(), Some(120_000));
    }

    #[test]
    fn test_missing_peerstore_entry_defaults_to_unknown() {
        let peerstore = HashMap::new();
        let peers = vec![gossip_peer("p2", "84.10.0.2", vec![])];

        let table = build_table(&peerstore, &peers, Some(0), &NullResolver);
        let rec = &table.records[0];
        assert_eq!(rec.user_agent, "Unknown");
        assert_eq!(rec.family, ClientFamily::Unknown);
        assert_eq!(rec.latency_secs, None);
    }

    #[test]
    fn test_missing_observation_time_falls_back_to_last_event() {
        let peerstore = HashMap::new();
        let peers = vec![
            gossip_peer(
                "p1",
                "84.10.0.1",
                vec![("Connection", 0), ("Disconnection", 120_000)],
            ),
            gossip_peer("p2", "84.10.0.2", vec![("Connection", 60_000)]),
        ];

        let table = build_table(&peerstore, &peers, None, &NullResolver);
        // p2's open session runs to the newest event seen anywhere (120 s).
        let p2 = table.records.iter().find(|r| r.peer_id == "p2").unwrap();
        assert_eq!(p2.connections, 1);
        assert!((p2.connected_minutes - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_csv_round_trip_preserves_aggregation_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");

        let mut peerstore = HashMap::new();
        peerstore.insert(
            "p1".to_string(),
            PeerstoreEntry {
                user_agent: Some("teku/v21.1.0+abcd/linux".to_string()),
                latency: Some(1_500_000_000.0),
                addrs: vec!["/ip4/84.10.0.9/tcp/9000".to_string()],
            },
        );
        let mut peer = gossip_peer(
            "p1",
            "84.10.0.9",
            vec![("Connection", 0), ("Disconnection", 90_000)],
        );
        peer.beacon_block.cnt = 42;

        let table = build_table(&peerstore, &[peer], Some(100_000), &NullResolver);
        table.to_csv(&path).unwrap();
        let reloaded = PeerTable::from_csv(&path, table.peerstore_size).unwrap();

        assert_eq!(reloaded.records.len(), 1);
        let (a, b) = (&table.records[0], &reloaded.records[0]);
        assert_eq!(a.family, b.family);
        assert_eq!(a.version, b.version);
        assert_eq!(a.connections, b.connections);
        assert_eq!(a.messages.beacon_block, b.messages.beacon_block);
        assert!((a.connected_minutes - b.connected_minutes).abs() < 0.05);
        assert_eq!(b.addrs, vec!["/ip4/84.10.0.9/tcp/9000".to_string()]);
    }
}
