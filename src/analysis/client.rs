//! Client family classification from libp2p user-agent strings.
//!
//! User agents are free text and the mapping is a best-effort heuristic:
//! false positives are acceptable, panics are not. Matching is done on a
//! lowercased copy; the returned version token keeps the original casing.

use serde::{Deserialize, Serialize};

/// The consensus-layer client implementations the crawler distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientFamily {
    Lighthouse,
    Teku,
    Nimbus,
    Prysm,
    Lodestar,
    Unknown,
}

impl ClientFamily {
    /// All families, in the fixed order used by tables and charts.
    pub const ALL: [ClientFamily; 6] = [
        ClientFamily::Lighthouse,
        ClientFamily::Teku,
        ClientFamily::Nimbus,
        ClientFamily::Prysm,
        ClientFamily::Lodestar,
        ClientFamily::Unknown,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ClientFamily::Lighthouse => "Lighthouse",
            ClientFamily::Teku => "Teku",
            ClientFamily::Nimbus => "Nimbus",
            ClientFamily::Prysm => "Prysm",
            ClientFamily::Lodestar => "Lodestar",
            ClientFamily::Unknown => "Unknown",
        }
    }

    /// Inverse of [`label`](Self::label); anything unrecognized is Unknown.
    pub fn from_label(label: &str) -> ClientFamily {
        Self::ALL
            .into_iter()
            .find(|f| f.label().eq_ignore_ascii_case(label))
            .unwrap_or(ClientFamily::Unknown)
    }
}

impl std::fmt::Display for ClientFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Result of classifying one user-agent string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub family: ClientFamily,
    /// Normalized version token, empty when none could be extracted.
    pub version: String,
}

/// Map a raw user-agent string to a client family and version token.
///
/// Substring checks are ordered: Prysm is ruled out before the "lod" check
/// so Lodestar cannot swallow Prysm-embedded strings, and Lodestar's
/// networking stack identifying itself as plain "js-libp2p" still counts
/// as Lodestar.
pub fn classify(user_agent: &str) -> Classification {
    let lowered = user_agent.to_lowercase();

    let family = if lowered.is_empty() {
        ClientFamily::Unknown
    } else if lowered.contains("ligh") {
        ClientFamily::Lighthouse
    } else if lowered.contains("teku") {
        ClientFamily::Teku
    } else if lowered.contains("nim") {
        ClientFamily::Nimbus
    } else if lowered.contains("pry") {
        ClientFamily::Prysm
    } else if lowered.contains("lod") || lowered.starts_with("js-libp2p") {
        ClientFamily::Lodestar
    } else {
        ClientFamily::Unknown
    };

    let version = match family {
        ClientFamily::Unknown => String::new(),
        _ => extract_version(user_agent, family),
    };

    Classification { family, version }
}

/// Pull the version token out of a slash-delimited user agent.
///
/// Examples across families:
///   "Lighthouse/v1.0.3-65dcdc3/x86_64-linux" -> "v1.0.3"
///   "teku/v21.1.0+abcd/linux"               -> "v21.1.0"
///   "Prysm/v1.1.0/9b367b36fc1..."           -> "v1.1.0"
///   "js-libp2p/0.32.0"                      -> "0.32.0"
fn extract_version(user_agent: &str, family: ClientFamily) -> String {
    let Some(token) = version_token(user_agent) else {
        return String::new();
    };

    // Build metadata comes after '+'; Lighthouse also appends a short commit
    // hash after '-'.
    let token = token.split('+').next().unwrap_or(token);
    let token = if family == ClientFamily::Lighthouse {
        token.split('-').next().unwrap_or(token)
    } else {
        token
    };
    token.to_string()
}

/// First slash-delimited segment (after the client name) that looks like a
/// version: "v" plus a digit, or a leading digit.
fn version_token(user_agent: &str) -> Option<&str> {
    user_agent.split('/').skip(1).find(|segment| {
        let mut chars = segment.chars();
        match chars.next() {
            Some('v') | Some('V') => chars.next().is_some_and(|c| c.is_ascii_digit()),
            Some(c) => c.is_ascii_digit(),
            None => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lighthouse_with_commit_suffix() {
        let c = classify("Lighthouse/v1.0.3-65dcdc3/x86_64-linux");
        assert_eq!(c.family, ClientFamily::Lighthouse);
        assert_eq!(c.version, "v1.0.3");
    }

    #[test]
    fn test_teku_strips_build_metadata_and_platform() {
        let c = classify("teku/v21.1.0+abcd/linux");
        assert_eq!(c.family, ClientFamily::Teku);
        assert_eq!(c.version, "v21.1.0");
    }

    #[test]
    fn test_teku_double_name_segment() {
        let c = classify("teku/teku/v21.1.0+g2b1f0a/linux-x86_64");
        assert_eq!(c.family, ClientFamily::Teku);
        assert_eq!(c.version, "v21.1.0");
    }

    #[test]
    fn test_prysm_keeps_plain_version() {
        let c = classify("Prysm/v1.1.0/9b367b36fc12ecf565ad649209aa2b5bba8c7797");
        assert_eq!(c.family, ClientFamily::Prysm);
        assert_eq!(c.version, "v1.1.0");
    }

    #[test]
    fn test_js_libp2p_is_lodestar() {
        let c = classify("js-libp2p/0.32.0");
        assert_eq!(c.family, ClientFamily::Lodestar);
        assert_eq!(c.version, "0.32.0");
    }

    #[test]
    fn test_empty_string_is_unknown_with_empty_version() {
        let c = classify("");
        assert_eq!(c.family, ClientFamily::Unknown);
        assert_eq!(c.version, "");
    }

    #[test]
    fn test_unmatched_agent_is_unknown() {
        let c = classify("erigon/v2.30.0/linux");
        assert_eq!(c.family, ClientFamily::Unknown);
        assert_eq!(c.version, "");
    }

    #[test]
    fn test_nimbus_without_version_segment() {
        let c = classify("nimbus");
        assert_eq!(c.family, ClientFamily::Nimbus);
        assert_eq!(c.version, "");
    }

    #[test]
    fn test_matching_is_case_insensitive_but_version_keeps_casing() {
        let c = classify("TEKU/V21.1.0+abc/linux");
        assert_eq!(c.family, ClientFamily::Teku);
        assert_eq!(c.version, "V21.1.0");
    }

    #[test]
    fn test_non_ascii_input_does_not_panic() {
        let c = classify("пир/узел/v1.0");
        assert_eq!(c.family, ClientFamily::Unknown);
    }

    #[test]
    fn test_family_label_round_trip() {
        for family in ClientFamily::ALL {
            assert_eq!(ClientFamily::from_label(family.label()), family);
        }
        assert_eq!(ClientFamily::from_label("teku"), ClientFamily::Teku);
        assert_eq!(ClientFamily::from_label("gethish"), ClientFamily::Unknown);
    }
}
