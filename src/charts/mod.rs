//! Chart output for analysis reports.

pub mod svg;

pub use svg::{bar_chart, pie_chart, stacked_area_chart, ChartOptions};

use crate::analysis::client::ClientFamily;

/// Fill colors matching the usual consensus-client palette, aligned with
/// [`ClientFamily::ALL`].
pub const FAMILY_COLORS: [&str; 6] = [
    "#55a868", // Lighthouse
    "#4c72b0", // Teku
    "#dd8452", // Nimbus
    "#c44e52", // Prysm
    "#8172b3", // Lodestar
    "#937860", // Unknown
];

/// Options preset for per-family charts.
pub fn family_chart_options(title: &str, y_label: &str) -> ChartOptions {
    ChartOptions {
        title: title.to_string(),
        y_label: Some(y_label.to_string()),
        colors: FAMILY_COLORS.iter().map(|c| c.to_string()).collect(),
    }
}

/// Labels for per-family charts, in palette order.
pub fn family_labels() -> Vec<String> {
    ClientFamily::ALL.iter().map(|f| f.label().to_string()).collect()
}
