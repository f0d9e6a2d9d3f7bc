//! Peerscope: offline analysis of discovery-crawler snapshots from an
//! Ethereum consensus-layer network.
//!
//! A snapshot is a directory of JSON exports written by the crawler: the
//! libp2p peerstore, per-peer gossip metrics, and run metadata. This crate
//! joins them into a peer table, classifies clients from their user agents,
//! reconstructs connection sessions from raw event streams, geolocates
//! peers, and renders the summary figures.

pub mod analysis;
pub mod charts;
pub mod geo;
pub mod report;
pub mod snapshot;
pub mod table;
