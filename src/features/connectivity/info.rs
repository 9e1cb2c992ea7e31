//! Connection status and link quality snapshots.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse reachability classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Backend reachable
    Online,
    /// Backend unreachable
    Offline,
    /// Reachable, but over a very slow link
    Slow,
}

impl ConnectionStatus {
    /// Get the display name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Slow => "slow",
        }
    }

    /// Whether requests can be attempted at all.
    #[must_use]
    pub const fn is_reachable(&self) -> bool {
        matches!(self, Self::Online | Self::Slow)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effective link class, slowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EffectiveType {
    /// Slower than 2G
    #[serde(rename = "slow-2g")]
    Slow2g,
    /// 2G
    #[serde(rename = "2g")]
    TwoG,
    /// 3G
    #[serde(rename = "3g")]
    ThreeG,
    /// 4G or better
    #[serde(rename = "4g")]
    FourG,
}

impl EffectiveType {
    /// Name as reported by the platform.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Slow2g => "slow-2g",
            Self::TwoG => "2g",
            Self::ThreeG => "3g",
            Self::FourG => "4g",
        }
    }
}

impl fmt::Display for EffectiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Link metrics reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LinkQuality {
    /// Effective link class
    pub effective_type: Option<EffectiveType>,
    /// Estimated downlink, in Mbps
    pub downlink: Option<f64>,
    /// Estimated round-trip time, in milliseconds
    pub rtt: Option<u32>,
    /// User asked for reduced data usage
    pub save_data: bool,
}

/// Snapshot handed to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Current status
    pub status: ConnectionStatus,
    /// Effective link class, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_type: Option<EffectiveType>,
    /// Estimated downlink, in Mbps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downlink: Option<f64>,
    /// Estimated round-trip time, in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtt: Option<u32>,
    /// Data saver enabled
    pub save_data: bool,
}

impl ConnectionInfo {
    /// Snapshot combining a status with the last known link metrics.
    #[must_use]
    pub const fn new(status: ConnectionStatus, link: &LinkQuality) -> Self {
        Self {
            status,
            effective_type: link.effective_type,
            downlink: link.downlink,
            rtt: link.rtt,
            save_data: link.save_data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_type_order() {
        assert!(EffectiveType::Slow2g < EffectiveType::TwoG);
        assert!(EffectiveType::TwoG < EffectiveType::ThreeG);
        assert!(EffectiveType::ThreeG < EffectiveType::FourG);
    }

    #[test]
    fn test_effective_type_names() {
        assert_eq!(serde_json::to_string(&EffectiveType::Slow2g).unwrap(), "\"slow-2g\"");
        let parsed: EffectiveType = serde_json::from_str("\"3g\"").unwrap();
        assert_eq!(parsed, EffectiveType::ThreeG);
        assert_eq!(EffectiveType::FourG.to_string(), "4g");
    }

    #[test]
    fn test_reachable() {
        assert!(ConnectionStatus::Online.is_reachable());
        assert!(ConnectionStatus::Slow.is_reachable());
        assert!(!ConnectionStatus::Offline.is_reachable());
    }

    #[test]
    fn test_info_serialization_skips_unknown_metrics() {
        let info = ConnectionInfo::new(ConnectionStatus::Offline, &LinkQuality::default());
        let json = serde_json::to_value(info).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "offline", "save_data": false }));
    }
}
