//! Connection event coalescing.
//!
//! The crawler fires duplicate connect/disconnect notifications in quick
//! bursts; this module collapses a peer's raw event log into connection and
//! disconnection counts plus total connected time.

use serde::{Deserialize, Serialize};

use crate::snapshot::{ConnectionEvent, EventKind};

/// Minimum gap between two events of the same type for the second one to
/// count as a distinct transition. Anything closer is treated as noise.
pub const DEBOUNCE_WINDOW_MILLIS: i64 = 500;

/// Coalesced view of one peer's connection history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub connections: u64,
    pub disconnections: u64,
    pub connected_minutes: f64,
}

/// Running min/max of observed event timestamps.
///
/// Threaded through coalescing as an explicit value rather than the global
/// start/finish trackers the crawler scripts used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBounds {
    first_millis: Option<i64>,
    last_millis: Option<i64>,
}

impl TimeBounds {
    pub fn observe(&mut self, time_millis: i64) {
        self.first_millis = Some(match self.first_millis {
            Some(first) => first.min(time_millis),
            None => time_millis,
        });
        self.last_millis = Some(match self.last_millis {
            Some(last) => last.max(time_millis),
            None => time_millis,
        });
    }

    pub fn merge(&mut self, other: &TimeBounds) {
        if let Some(first) = other.first_millis {
            self.observe(first);
        }
        if let Some(last) = other.last_millis {
            self.observe(last);
        }
    }

    pub fn first_millis(&self) -> Option<i64> {
        self.first_millis
    }

    pub fn last_millis(&self) -> Option<i64> {
        self.last_millis
    }
}

/// Coalesce a peer's chronological event log into counts and connected time.
///
/// `observed_at` is the snapshot wall-clock in milliseconds; a peer whose
/// last genuine transition is a Connection was still connected when the
/// snapshot was taken and contributes the open session up to `observed_at`.
///
/// Total over any input: malformed logs (a Disconnection with no preceding
/// Connection) skip the duration delta with a warning instead of producing
/// a negative total.
pub fn coalesce_events(
    events: &[ConnectionEvent],
    observed_at: i64,
) -> (SessionSummary, TimeBounds) {
    let mut summary = SessionSummary::default();
    let mut bounds = TimeBounds::default();

    let mut prev_kind = EventKind::Disconnection;
    let mut prev_time: i64 = 0;
    let mut last_connect: i64 = 0;
    let mut connected = false;
    let mut total_millis: i64 = 0;

    for event in events {
        bounds.observe(event.time_millis);

        let transition =
            event.kind != prev_kind || event.time_millis >= prev_time + DEBOUNCE_WINDOW_MILLIS;
        if !transition {
            continue;
        }

        match event.kind {
            EventKind::Connection => {
                summary.connections += 1;
                last_connect = event.time_millis;
                connected = true;
            }
            EventKind::Disconnection => {
                summary.disconnections += 1;
                if connected {
                    total_millis += (event.time_millis - last_connect).max(0);
                } else {
                    log::warn!(
                        "disconnection at {} without a preceding connection, skipping delta",
                        event.time_millis
                    );
                }
                last_connect = event.time_millis;
                connected = false;
            }
        }
        prev_kind = event.kind;
        prev_time = event.time_millis;
    }

    // Open session at snapshot time.
    if connected {
        total_millis += (observed_at - last_connect).max(0);
    }

    summary.connected_minutes = total_millis as f64 / 60_000.0;
    (summary, bounds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(t: i64) -> ConnectionEvent {
        ConnectionEvent {
            kind: EventKind::Connection,
            time_millis: t,
        }
    }

    fn disc(t: i64) -> ConnectionEvent {
        ConnectionEvent {
            kind: EventKind::Disconnection,
            time_millis: t,
        }
    }

    #[test]
    fn test_empty_log_yields_zeroes() {
        let (summary, bounds) = coalesce_events(&[], 1_000_000);
        assert_eq!(summary, SessionSummary::default());
        assert_eq!(bounds.first_millis(), None);
        assert_eq!(bounds.last_millis(), None);
    }

    #[test]
    fn test_single_closed_session() {
        let events = vec![conn(60_000), disc(180_000)];
        let (summary, _) = coalesce_events(&events, 300_000);
        assert_eq!(summary.connections, 1);
        assert_eq!(summary.disconnections, 1);
        assert!((summary.connected_minutes - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_open_session_extends_to_snapshot_time() {
        let events = vec![conn(60_000)];
        let (summary, _) = coalesce_events(&events, 360_000);
        assert_eq!(summary.connections, 1);
        assert_eq!(summary.disconnections, 0);
        // 5 minutes between connect and snapshot.
        assert!((summary.connected_minutes - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_duplicate_burst_coalesces_to_one_transition() {
        // All within the debounce window of the first event.
        let events = vec![conn(1_000), conn(1_100), conn(1_350), conn(1_499)];
        let (summary, _) = coalesce_events(&events, 1_499);
        assert_eq!(summary.connections, 1);
    }

    #[test]
    fn test_same_type_beyond_window_counts_again() {
        let events = vec![conn(1_000), conn(1_500)];
        let (summary, _) = coalesce_events(&events, 1_500);
        assert_eq!(summary.connections, 2);
    }

    #[test]
    fn test_noise_events_do_not_advance_the_clock() {
        // The burst of disconnections after the genuine one must not extend
        // the session total.
        let events = vec![conn(0), disc(60_000), disc(60_100), disc(60_200)];
        let (summary, _) = coalesce_events(&events, 120_000);
        assert_eq!(summary.connections, 1);
        assert_eq!(summary.disconnections, 1);
        assert!((summary.connected_minutes - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_orphan_disconnection_does_not_panic_or_go_negative() {
        let events = vec![disc(90_000), conn(120_000), disc(180_000)];
        let (summary, _) = coalesce_events(&events, 200_000);
        assert_eq!(summary.connections, 1);
        assert_eq!(summary.disconnections, 2);
        assert!(summary.connected_minutes >= 0.0);
        assert!((summary.connected_minutes - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_before_last_connect_is_clamped() {
        let events = vec![conn(500_000)];
        let (summary, _) = coalesce_events(&events, 400_000);
        assert_eq!(summary.connected_minutes, 0.0);
    }

    #[test]
    fn test_time_bounds_track_all_events_including_noise() {
        let events = vec![conn(1_000), conn(1_200), disc(90_000)];
        let (_, bounds) = coalesce_events(&events, 100_000);
        assert_eq!(bounds.first_millis(), Some(1_000));
        assert_eq!(bounds.last_millis(), Some(90_000));
    }

    #[test]
    fn test_merge_bounds() {
        let mut a = TimeBounds::default();
        a.observe(10);
        let mut b = TimeBounds::default();
        b.observe(5);
        b.observe(20);
        a.merge(&b);
        assert_eq!(a.first_millis(), Some(5));
        assert_eq!(a.last_millis(), Some(20));
    }
}
