//! Snapshot models and loading for crawler output files.

pub mod loader;
pub mod types;

pub use loader::{load_custom_metrics, load_gossip_peers, load_peerstore, snapshot_observed_at};
pub use types::*;
