//! Per-group aggregation over the peer table.
//!
//! Groups are label lists (typically the six client families) matched by
//! case-insensitive substring containment against a text column, the same
//! matching the original tooling used. Grouping by the classified
//! `ClientFamily` column makes containment behave as exact match, since
//! that column only ever holds the six enum labels.

use serde::{Deserialize, Serialize};

use crate::table::PeerRecord;

/// How matching rows are folded into one value per group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateMode {
    /// Number of matching rows.
    Count,
    /// Integer-coerced sum of the target column; missing values count as 0.
    Sum,
    /// Mean of the target column over matching rows with a non-zero value,
    /// rounded to one decimal; 0 when nothing contributes.
    Average,
}

fn row_matches(record: &PeerRecord, group_column: &str, label: &str) -> bool {
    record
        .text_field(group_column)
        .map(|value| value.to_lowercase().contains(&label.to_lowercase()))
        .unwrap_or(false)
}

/// Compute one value per label over the record set.
///
/// `target` names the numeric column for Sum/Average and is ignored for
/// Count. An absent or empty group column yields a zero-filled vector.
pub fn aggregate(
    records: &[PeerRecord],
    target: &str,
    group_column: &str,
    labels: &[String],
    mode: AggregateMode,
) -> Vec<f64> {
    labels
        .iter()
        .map(|label| {
            let matching: Vec<&PeerRecord> = records
                .iter()
                .filter(|r| row_matches(r, group_column, label))
                .collect();

            match mode {
                AggregateMode::Count => matching.len() as f64,
                AggregateMode::Sum => matching
                    .iter()
                    .map(|r| r.numeric_field(target).unwrap_or(0.0) as i64)
                    .sum::<i64>() as f64,
                AggregateMode::Average => {
                    let values: Vec<f64> = matching
                        .iter()
                        .filter_map(|r| r.numeric_field(target))
                        .filter(|v| *v != 0.0)
                        .collect();
                    if values.is_empty() {
                        0.0
                    } else {
                        let mean = values.iter().sum::<f64>() / values.len() as f64;
                        (mean * 10.0).round() / 10.0
                    }
                }
            }
        })
        .collect()
}

/// Distinct values of a text column, in first-seen order.
pub fn distinct_values(records: &[PeerRecord], column: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for record in records {
        if let Some(value) = record.text_field(column) {
            if !seen.contains(&value) {
                seen.push(value);
            }
        }
    }
    seen
}
