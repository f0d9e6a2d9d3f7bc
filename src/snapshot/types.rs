//! Data models for the crawler snapshot files.
//!
//! A snapshot is three JSON files produced by one crawler run: the peerstore
//! (libp2p identify data), the gossip metrics (per-peer connection events and
//! message counters), and the custom metrics (run clock and peerstore summary).

use serde::{Deserialize, Serialize};

/// One entry of the peerstore JSON, keyed by peer id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PeerstoreEntry {
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Identify round-trip latency in nanoseconds.
    #[serde(default)]
    pub latency: Option<f64>,
    #[serde(default)]
    pub addrs: Vec<String>,
}

/// Whether a connection event opened or closed a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Connection,
    Disconnection,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Connection => write!(f, "Connection"),
            EventKind::Disconnection => write!(f, "Disconnection"),
        }
    }
}

/// A single connect/disconnect observation for one peer.
///
/// Timestamps are wall-clock milliseconds; events arrive in chronological
/// order within a peer's log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConnectionEvent {
    pub kind: EventKind,
    pub time_millis: i64,
}

/// Raw connection event as serialized by the crawler.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConnectionEvent {
    #[serde(rename = "ConnectionType", default)]
    pub connection_type: String,
    #[serde(rename = "TimeMili", default)]
    pub time_mili: i64,
}

/// Per-topic message counter (`{"Cnt": N}` in the gossip JSON).
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TopicMetrics {
    #[serde(rename = "Cnt", default)]
    pub cnt: u64,
}

/// One peer of the gossip-metrics JSON, keyed by peer id.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GossipPeer {
    #[serde(rename = "PeerId")]
    pub peer_id: String,
    #[serde(rename = "NodeId")]
    pub node_id: String,
    #[serde(rename = "ClientType")]
    pub client_type: String,
    #[serde(rename = "Pubkey")]
    pub pubkey: String,
    #[serde(rename = "Ip")]
    pub ip: String,
    #[serde(rename = "Country")]
    pub country: String,
    #[serde(rename = "City")]
    pub city: String,
    #[serde(rename = "Addrs")]
    pub addrs: Vec<String>,
    #[serde(rename = "MetadataRequest")]
    pub metadata_request: bool,
    #[serde(rename = "ConnectionEvents")]
    pub connection_events: Vec<RawConnectionEvent>,
    #[serde(rename = "BeaconBlock")]
    pub beacon_block: TopicMetrics,
    #[serde(rename = "BeaconAggregateProof")]
    pub beacon_aggregate_proof: TopicMetrics,
    #[serde(rename = "VoluntaryExit")]
    pub voluntary_exit: TopicMetrics,
    #[serde(rename = "ProposerSlashing")]
    pub proposer_slashing: TopicMetrics,
    #[serde(rename = "AttesterSlashing")]
    pub attester_slashing: TopicMetrics,
}

impl GossipPeer {
    /// Typed view of the raw connection events, dropping entries with an
    /// unrecognized type or a negative timestamp.
    pub fn events(&self) -> Vec<ConnectionEvent> {
        let mut events = Vec::with_capacity(self.connection_events.len());
        for raw in &self.connection_events {
            let kind = match raw.connection_type.as_str() {
                "Connection" => EventKind::Connection,
                "Disconnection" => EventKind::Disconnection,
                other => {
                    log::warn!(
                        "peer {}: skipping event with unknown type {:?}",
                        self.peer_id,
                        other
                    );
                    continue;
                }
            };
            if raw.time_mili < 0 {
                log::warn!(
                    "peer {}: skipping event with negative timestamp {}",
                    self.peer_id,
                    raw.time_mili
                );
                continue;
            }
            events.push(ConnectionEvent {
                kind,
                time_millis: raw.time_mili,
            });
        }
        events
    }
}

/// Crawler run clock as stored in the custom-metrics JSON.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotClock {
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Month")]
    pub month: u32,
    #[serde(rename = "Day")]
    pub day: u32,
    #[serde(rename = "Hour")]
    pub hour: u32,
    #[serde(rename = "Minute")]
    pub minute: u32,
}

impl SnapshotClock {
    /// Zero-padded `YYYY/MM/DD` label used by the progression charts.
    pub fn date_label(&self) -> String {
        format!("{:04}/{:02}/{:02}", self.year, self.month, self.day)
    }
}

/// Custom-metrics JSON: run clock plus peerstore summary counts.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CustomMetrics {
    #[serde(rename = "StartTime")]
    pub start_time: SnapshotClock,
    #[serde(rename = "StopTime")]
    pub stop_time: SnapshotClock,
}
