//! Configuration for the lanwarden-discover scanner.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DiscoverError;

/// Top-level discover configuration.
///
/// Loaded from the `[discover]` section of `lanwarden.toml` or from
/// `LANWARDEN_DISCOVER__` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    /// Per-subnet scheduling configuration.
    #[serde(default)]
    pub subnets: Vec<SubnetSchedule>,

    /// Port tier used when a subnet or request does not name one.
    #[serde(default)]
    pub default_tier: ScanTier,

    /// Ports used by the `custom` tier.
    #[serde(default)]
    pub custom_ports: Vec<u16>,

    /// Per-host ICMP reply deadline.
    #[serde(default = "default_liveness_timeout")]
    pub liveness_timeout_ms: u64,

    /// TCP connect timeout per port.
    #[serde(default = "default_port_timeout")]
    pub port_timeout_ms: u64,

    /// Pause between ports on the same host.
    #[serde(default = "default_inter_port_delay")]
    pub inter_port_delay_ms: u64,

    /// Read a service banner from each open port.
    #[serde(default = "default_true")]
    pub grab_banners: bool,

    #[serde(default = "default_banner_timeout")]
    pub banner_timeout_ms: u64,

    /// Hosts probed or port-scanned at once. 1 makes both phases sequential.
    #[serde(default = "default_host_concurrency")]
    pub host_concurrency: usize,

    /// `address:port` keys of approved AI inference endpoints.
    #[serde(default)]
    pub authorized_ai_services: Vec<String>,

    /// Acknowledged devices, by IPv4 address or MAC.
    #[serde(default)]
    pub known_devices: Vec<String>,

    /// Unknown hosts first seen within this many hours are reported as rogue.
    #[serde(default = "default_rogue_window")]
    pub rogue_window_hours: i64,

    /// Net new open ports on one host that count as a burst.
    #[serde(default = "default_burst_threshold")]
    pub anomaly_burst_threshold: usize,

    /// Directory for persisted snapshots.
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: String,

    /// Watchdog for a whole scheduled cycle.
    #[serde(default = "default_cycle_timeout")]
    pub cycle_timeout_secs: u64,
}

/// A subnet with its scan schedule.
#[derive(Debug, Clone, Deserialize)]
pub struct SubnetSchedule {
    /// CIDR (`192.168.1.0/24`) or three-octet prefix (`192.168.1`).
    pub cidr: String,

    /// Human-readable name for this subnet.
    pub name: Option<String>,

    /// Tier override for this subnet.
    pub tier: Option<ScanTier>,

    /// Scan interval in seconds.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Whether this subnet is enabled for scanning.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Named port sets. See `ports` for the lists themselves.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ScanTier {
    /// A couple dozen of the most common services.
    Quick,
    /// Every port in the service knowledge base.
    #[default]
    Standard,
    /// 1-1024 plus notable high ports.
    Full,
    Backdoors,
    HomeAutomation,
    AiServices,
    /// `custom_ports` from the config, or `--ports` on the command line.
    Custom,
}

impl ScanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quick => "quick",
            Self::Standard => "standard",
            Self::Full => "full",
            Self::Backdoors => "backdoors",
            Self::HomeAutomation => "home-automation",
            Self::AiServices => "ai-services",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ScanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanTier {
    type Err = DiscoverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "quick" => Ok(Self::Quick),
            "standard" => Ok(Self::Standard),
            "full" => Ok(Self::Full),
            "backdoors" => Ok(Self::Backdoors),
            "home-automation" => Ok(Self::HomeAutomation),
            "ai-services" | "ai" => Ok(Self::AiServices),
            "custom" => Ok(Self::Custom),
            _ => Err(DiscoverError::Config(format!(
                "Invalid tier: {s}. Choose: quick, standard, full, backdoors, \
                 home-automation, ai-services, custom"
            ))),
        }
    }
}

fn default_liveness_timeout() -> u64 {
    1000
}

fn default_port_timeout() -> u64 {
    500
}

fn default_inter_port_delay() -> u64 {
    20
}

fn default_banner_timeout() -> u64 {
    300
}

fn default_host_concurrency() -> usize {
    32
}

fn default_rogue_window() -> i64 {
    24
}

fn default_burst_threshold() -> usize {
    5
}

fn default_snapshot_dir() -> String {
    "./snapshots".to_string()
}

fn default_cycle_timeout() -> u64 {
    1800
}

fn default_interval() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            subnets: Vec::new(),
            default_tier: ScanTier::default(),
            custom_ports: Vec::new(),
            liveness_timeout_ms: default_liveness_timeout(),
            port_timeout_ms: default_port_timeout(),
            inter_port_delay_ms: default_inter_port_delay(),
            grab_banners: true,
            banner_timeout_ms: default_banner_timeout(),
            host_concurrency: default_host_concurrency(),
            authorized_ai_services: Vec::new(),
            known_devices: Vec::new(),
            rogue_window_hours: default_rogue_window(),
            anomaly_burst_threshold: default_burst_threshold(),
            snapshot_dir: default_snapshot_dir(),
            cycle_timeout_secs: default_cycle_timeout(),
        }
    }
}

impl DiscoverConfig {
    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    pub fn port_timeout(&self) -> Duration {
        Duration::from_millis(self.port_timeout_ms)
    }

    pub fn inter_port_delay(&self) -> Duration {
        Duration::from_millis(self.inter_port_delay_ms)
    }

    /// `None` when banner grabbing is off.
    pub fn banner_timeout(&self) -> Option<Duration> {
        self.grab_banners
            .then(|| Duration::from_millis(self.banner_timeout_ms))
    }

    /// Concurrency clamped to at least one worker.
    pub fn workers(&self) -> usize {
        self.host_concurrency.max(1)
    }

    pub fn rogue_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.rogue_window_hours.max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DiscoverConfig::default();
        assert_eq!(config.default_tier, ScanTier::Standard);
        assert_eq!(config.port_timeout(), Duration::from_millis(500));
        assert_eq!(config.inter_port_delay(), Duration::from_millis(20));
        assert_eq!(config.banner_timeout(), Some(Duration::from_millis(300)));
        assert_eq!(config.rogue_window_hours, 24);
        assert_eq!(config.anomaly_burst_threshold, 5);
    }

    #[test]
    fn test_tier_parsing() {
        assert_eq!("quick".parse::<ScanTier>().unwrap(), ScanTier::Quick);
        assert_eq!("AI_SERVICES".parse::<ScanTier>().unwrap(), ScanTier::AiServices);
        assert_eq!(
            "home-automation".parse::<ScanTier>().unwrap(),
            ScanTier::HomeAutomation
        );
        assert!("deep".parse::<ScanTier>().is_err());
    }

    #[test]
    fn test_tier_display_roundtrip() {
        for tier in [
            ScanTier::Quick,
            ScanTier::Standard,
            ScanTier::Full,
            ScanTier::Backdoors,
            ScanTier::HomeAutomation,
            ScanTier::AiServices,
            ScanTier::Custom,
        ] {
            assert_eq!(tier.to_string().parse::<ScanTier>().unwrap(), tier);
        }
    }

    #[test]
    fn test_zero_concurrency_clamped() {
        let config = DiscoverConfig {
            host_concurrency: 0,
            grab_banners: false,
            ..Default::default()
        };
        assert_eq!(config.workers(), 1);
        assert_eq!(config.banner_timeout(), None);
    }

    #[test]
    fn test_deserialize_section() {
        let json = serde_json::json!({
            "default_tier": "ai-services",
            "subnets": [{ "cidr": "10.0.0.0/24", "name": "lab" }],
            "authorized_ai_services": ["10.0.0.5:11434"]
        });
        let config: DiscoverConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.default_tier, ScanTier::AiServices);
        assert_eq!(config.subnets[0].interval_secs, 3600);
        assert!(config.subnets[0].enabled);
        assert_eq!(config.host_concurrency, 32);
    }
}
