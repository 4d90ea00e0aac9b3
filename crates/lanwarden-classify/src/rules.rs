//! The standard rule set.
//!
//! Most rules are "port X is open" checks and share `PortRule`. The rest
//! look at the host as a whole (counts, identity, banners).

use lanwarden_core::services::ServiceCategory;
use lanwarden_core::types::{FindingCategory, HostRecord, Severity};

use crate::engine::{Draft, Rule, RuleEnv};

/// Every standard rule, in evaluation order.
pub fn standard_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(BackdoorPortRule),
        Box::new(BackdoorBannerRule),
        Box::new(TELNET),
        Box::new(FTP),
        Box::new(DATABASE),
        Box::new(REMOTE_DESKTOP),
        Box::new(SMB),
        Box::new(CONTAINER_API),
        Box::new(AMPLIFICATION),
        Box::new(PlaintextWebAdminRule),
        Box::new(UPNP),
        Box::new(MultipleRemoteAccessRule),
        Box::new(LargeAttackSurfaceRule),
        Box::new(IotClusterRule),
        Box::new(AiEndpointRule { authorized: false }),
        Box::new(AiEndpointRule { authorized: true }),
        Box::new(RogueDeviceRule),
        Box::new(RandomizedMacRule),
    ]
}

// ── Port presence rules ───────────────────────────────────────────

/// Fires once per open port in `ports`.
pub struct PortRule {
    pub id: &'static str,
    pub ports: &'static [u16],
    pub severity: Severity,
    pub category: FindingCategory,
    /// Title suffix after the service name.
    pub exposure: &'static str,
    pub description: &'static str,
    pub remediation: &'static str,
}

impl Rule for PortRule {
    fn id(&self) -> &'static str {
        self.id
    }

    fn evaluate(&self, host: &HostRecord, env: &RuleEnv<'_>) -> Vec<Draft> {
        host.open_ports()
            .filter(|p| self.ports.contains(&p.port))
            .map(|p| {
                let name = env.service_name(p);
                Draft::new(
                    self.severity,
                    self.category,
                    format!("{name} {} on port {}", self.exposure, p.port),
                )
                .port(p.port)
                .description(self.description)
                .remediation(self.remediation)
                .detail(format!("{}:{} open ({})", host.address, p.port, p.label))
            })
            .collect()
    }
}

pub const TELNET: PortRule = PortRule {
    id: "telnet-exposed",
    ports: &[23],
    severity: Severity::Critical,
    category: FindingCategory::WeakSecurity,
    exposure: "exposed",
    description: "Telnet sends credentials and session data in cleartext and is a \
                  common target for botnet credential stuffing.",
    remediation: "Disable Telnet and use SSH with key-based authentication.",
};

pub const FTP: PortRule = PortRule {
    id: "ftp-cleartext",
    ports: &[21],
    severity: Severity::High,
    category: FindingCategory::WeakSecurity,
    exposure: "accepting cleartext logins",
    description: "FTP transmits usernames and passwords without encryption.",
    remediation: "Replace FTP with SFTP or FTPS, or restrict it to a trusted segment.",
};

pub const DATABASE: PortRule = PortRule {
    id: "database-exposed",
    ports: &[3306, 5432, 1433, 1521, 27017, 6379, 9200, 5984, 9042, 7474],
    severity: Severity::Critical,
    category: FindingCategory::DataExposure,
    exposure: "reachable from the network",
    description: "A database listener is reachable by any host on the segment. Many \
                  of these ship without authentication by default.",
    remediation: "Bind the database to localhost or a management interface, require \
                  authentication, and firewall the port.",
};

pub const REMOTE_DESKTOP: PortRule = PortRule {
    id: "remote-desktop-exposed",
    ports: &[3389, 5900, 5901, 5902],
    severity: Severity::High,
    category: FindingCategory::ExposedService,
    exposure: "exposed",
    description: "Remote desktop services are frequently brute-forced and have a \
                  history of pre-authentication vulnerabilities.",
    remediation: "Restrict remote desktop to a VPN, enforce strong authentication, \
                  and keep the service patched.",
};

pub const SMB: PortRule = PortRule {
    id: "smb-exposed",
    ports: &[445, 139],
    severity: Severity::High,
    category: FindingCategory::ExposedService,
    exposure: "file sharing exposed",
    description: "SMB/NetBIOS file sharing is a common lateral-movement and \
                  ransomware propagation path.",
    remediation: "Disable SMBv1, restrict shares to required hosts, and block the \
                  port at segment boundaries.",
};

pub const CONTAINER_API: PortRule = PortRule {
    id: "container-api-exposed",
    ports: &[2375, 10250, 2379],
    severity: Severity::Critical,
    category: FindingCategory::ExposedService,
    exposure: "control API exposed",
    description: "Container and orchestration control APIs grant code execution on \
                  the host when reachable without authentication.",
    remediation: "Require TLS client authentication and bind the API to a \
                  management network only.",
};

pub const AMPLIFICATION: PortRule = PortRule {
    id: "amplification-service",
    ports: &[11211, 19, 1900],
    severity: Severity::High,
    category: FindingCategory::DosRisk,
    exposure: "usable for traffic amplification",
    description: "This service answers small requests with large responses and can \
                  be abused for reflected denial-of-service attacks.",
    remediation: "Disable the service if unused, or restrict it to trusted clients.",
};

pub const UPNP: PortRule = PortRule {
    id: "upnp-exposed",
    ports: &[5000, 49152],
    severity: Severity::Medium,
    category: FindingCategory::Misconfiguration,
    exposure: "control endpoint exposed",
    description: "UPnP control lets any LAN client open router ports and reconfigure \
                  the device.",
    remediation: "Disable UPnP on the device or router unless it is required.",
};

// ── Backdoors ─────────────────────────────────────────────────────

/// Any open port the knowledge base classifies as a backdoor.
pub struct BackdoorPortRule;

impl Rule for BackdoorPortRule {
    fn id(&self) -> &'static str {
        "backdoor-port"
    }

    fn evaluate(&self, host: &HostRecord, env: &RuleEnv<'_>) -> Vec<Draft> {
        host.open_ports()
            .filter(|p| env.category(p) == Some(ServiceCategory::Backdoor))
            .map(|p| {
                Draft::new(
                    Severity::Critical,
                    FindingCategory::Backdoor,
                    format!("Known backdoor port {} open ({})", p.port, env.service_name(p)),
                )
                .port(p.port)
                .description(
                    "The port is the default listener of a known trojan or remote \
                     access tool. Legitimate software rarely uses it.",
                )
                .remediation(
                    "Isolate the device, identify the listening process, and reimage \
                     if it cannot be accounted for.",
                )
                .detail(format!("{}:{} open", host.address, p.port))
            })
            .collect()
    }
}

/// Banner substrings of builds shipped with a backdoor.
pub const BACKDOOR_BANNERS: &[(&str, &str)] = &[
    ("vsftpd 2.3.4", "vsftpd 2.3.4 smiley-face backdoor"),
    ("unrealircd 3.2.8.1", "UnrealIRCd 3.2.8.1 trojaned release"),
    ("proftpd 1.3.3c", "ProFTPD 1.3.3c compromised source release"),
    ("miniserv/1.890", "Webmin 1.890 password_change backdoor"),
];

pub struct BackdoorBannerRule;

impl Rule for BackdoorBannerRule {
    fn id(&self) -> &'static str {
        "backdoor-banner"
    }

    fn evaluate(&self, host: &HostRecord, _env: &RuleEnv<'_>) -> Vec<Draft> {
        host.open_ports()
            .filter_map(|p| {
                let banner = p.banner.as_deref()?.to_ascii_lowercase();
                let (_, name) = BACKDOOR_BANNERS
                    .iter()
                    .find(|(needle, _)| banner.contains(needle))?;
                Some(
                    Draft::new(
                        Severity::Critical,
                        FindingCategory::Backdoor,
                        format!("Backdoored build on port {}: {name}", p.port),
                    )
                    .port(p.port)
                    .description(
                        "The service banner matches a release known to contain a \
                         remote-access backdoor.",
                    )
                    .remediation("Upgrade or remove the service immediately and audit the host.")
                    .detail(format!("banner: {banner}")),
                )
            })
            .collect()
    }
}

// ── Host-level rules ──────────────────────────────────────────────

/// 80 without 443, 8080 without 8443.
const PLAINTEXT_PAIRS: &[(u16, u16)] = &[(80, 443), (8080, 8443)];

pub struct PlaintextWebAdminRule;

impl Rule for PlaintextWebAdminRule {
    fn id(&self) -> &'static str {
        "plaintext-web-admin"
    }

    fn evaluate(&self, host: &HostRecord, _env: &RuleEnv<'_>) -> Vec<Draft> {
        PLAINTEXT_PAIRS
            .iter()
            .filter(|(plain, secure)| host.has_open(*plain) && !host.has_open(*secure))
            .map(|(plain, secure)| {
                Draft::new(
                    Severity::Medium,
                    FindingCategory::WeakSecurity,
                    format!("Web interface on port {plain} without TLS"),
                )
                .port(*plain)
                .description(
                    "The device serves HTTP with no HTTPS counterpart, so any admin \
                     login crosses the network in cleartext.",
                )
                .remediation("Enable HTTPS on the device and disable the plaintext listener.")
                .detail(format!("{plain} open, {secure} closed"))
            })
            .collect()
    }
}

pub struct MultipleRemoteAccessRule;

impl Rule for MultipleRemoteAccessRule {
    fn id(&self) -> &'static str {
        "multiple-remote-access"
    }

    fn evaluate(&self, host: &HostRecord, env: &RuleEnv<'_>) -> Vec<Draft> {
        let ports: Vec<u16> = host
            .open_ports()
            .filter(|p| env.category(p) == Some(ServiceCategory::RemoteAccess))
            .map(|p| p.port)
            .collect();
        if ports.len() < 2 {
            return Vec::new();
        }
        vec![Draft::new(
            Severity::Medium,
            FindingCategory::Misconfiguration,
            format!("{} remote access services on one host", ports.len()),
        )
        .description("Each remote access service is a separate way in to the same device.")
        .remediation("Keep one hardened remote access method and disable the others.")
        .detail(format!("ports: {ports:?}"))]
    }
}

pub const LARGE_ATTACK_SURFACE_THRESHOLD: usize = 10;

pub struct LargeAttackSurfaceRule;

impl Rule for LargeAttackSurfaceRule {
    fn id(&self) -> &'static str {
        "large-attack-surface"
    }

    fn evaluate(&self, host: &HostRecord, _env: &RuleEnv<'_>) -> Vec<Draft> {
        let open = host.open_ports().count();
        if open <= LARGE_ATTACK_SURFACE_THRESHOLD {
            return Vec::new();
        }
        vec![Draft::new(
            Severity::Low,
            FindingCategory::Misconfiguration,
            format!("{open} open ports"),
        )
        .description("The host exposes an unusually large number of services.")
        .remediation("Review the listening services and disable what is not needed.")
        .detail(format!("{open} open ports"))]
    }
}

pub const IOT_CLUSTER_THRESHOLD: usize = 3;

pub struct IotClusterRule;

impl Rule for IotClusterRule {
    fn id(&self) -> &'static str {
        "iot-cluster"
    }

    fn evaluate(&self, host: &HostRecord, env: &RuleEnv<'_>) -> Vec<Draft> {
        let ports: Vec<u16> = host
            .open_ports()
            .filter(|p| env.category(p) == Some(ServiceCategory::HomeAutomation))
            .map(|p| p.port)
            .collect();
        if ports.len() < IOT_CLUSTER_THRESHOLD {
            return Vec::new();
        }
        vec![Draft::new(
            Severity::Low,
            FindingCategory::Misconfiguration,
            format!("{} home automation services on one host", ports.len()),
        )
        .description("The device acts as a smart-home hub; compromise reaches every paired device.")
        .remediation("Place home automation devices on an isolated network segment.")
        .detail(format!("ports: {ports:?}"))]
    }
}

// ── AI endpoints ──────────────────────────────────────────────────

/// Open AI inference port, split by whether its `address:port` key is
/// authorized.
pub struct AiEndpointRule {
    pub authorized: bool,
}

impl Rule for AiEndpointRule {
    fn id(&self) -> &'static str {
        if self.authorized {
            "authorized-ai-endpoint"
        } else {
            "unauthorized-ai-endpoint"
        }
    }

    fn evaluate(&self, host: &HostRecord, env: &RuleEnv<'_>) -> Vec<Draft> {
        host.open_ports()
            .filter(|p| env.category(p) == Some(ServiceCategory::AiInference))
            .filter(|p| env.ctx.is_authorized(host.address, p.port) == self.authorized)
            .map(|p| {
                let name = env.service_name(p);
                let draft = if self.authorized {
                    Draft::new(
                        Severity::Info,
                        FindingCategory::ExposedService,
                        format!("Authorized AI endpoint {name} on port {}", p.port),
                    )
                    .description("An approved AI inference service is listening.")
                    .remediation("No action needed. Keep the service patched.")
                } else {
                    Draft::new(
                        Severity::High,
                        FindingCategory::SuspiciousActivity,
                        format!("Unauthorized AI endpoint {name} on port {}", p.port),
                    )
                    .description(
                        "An AI inference service that has not been approved is \
                         reachable. These usually accept prompts and uploads without \
                         authentication.",
                    )
                    .remediation(
                        "Confirm the owner, then authorize the endpoint or shut it down.",
                    )
                };
                draft.port(p.port).detail(format!("{}:{}", host.address, p.port))
            })
            .collect()
    }
}

// ── Device identity ───────────────────────────────────────────────

pub struct RogueDeviceRule;

impl Rule for RogueDeviceRule {
    fn id(&self) -> &'static str {
        "rogue-device"
    }

    fn evaluate(&self, host: &HostRecord, env: &RuleEnv<'_>) -> Vec<Draft> {
        if host.known {
            return Vec::new();
        }
        let age = env.ctx.now.signed_duration_since(host.first_seen);
        if age > env.ctx.rogue_window {
            return Vec::new();
        }
        vec![Draft::new(
            Severity::Medium,
            FindingCategory::RogueDevice,
            format!("Unrecognized device {}", host.address),
        )
        .description("A device that has not been acknowledged joined the network recently.")
        .remediation("Identify the device owner and mark it known, or remove it from the network.")
        .detail(format!("first seen {}", host.first_seen.to_rfc3339()))]
    }
}

/// True when the first octet has the locally-administered bit set.
pub fn is_locally_administered(mac: &str) -> Option<bool> {
    let hex: String = mac
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .take(2)
        .collect();
    if hex.len() < 2 {
        return None;
    }
    let first = u8::from_str_radix(&hex, 16).ok()?;
    Some(first & 0x02 != 0)
}

pub struct RandomizedMacRule;

impl Rule for RandomizedMacRule {
    fn id(&self) -> &'static str {
        "randomized-mac"
    }

    fn evaluate(&self, host: &HostRecord, _env: &RuleEnv<'_>) -> Vec<Draft> {
        let Some(mac) = host.mac.as_deref() else {
            return Vec::new();
        };
        if is_locally_administered(mac) != Some(true) {
            return Vec::new();
        }
        vec![Draft::new(
            Severity::Info,
            FindingCategory::RogueDevice,
            format!("Randomized MAC address {mac}"),
        )
        .description(
            "The hardware address is locally administered, typical of phones using \
             private addresses. The device cannot be tracked by MAC across networks.",
        )
        .remediation("Identify the device by hostname or owner rather than by MAC.")
        .detail(format!("mac: {mac}"))]
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use chrono::{Duration, Utc};
    use lanwarden_core::services::ServiceKnowledgeBase;
    use lanwarden_core::types::PortRecord;

    use super::*;
    use crate::engine::ClassifyContext;

    fn host(ports: Vec<PortRecord>) -> HostRecord {
        let mut h = HostRecord::discovered(Ipv4Addr::new(10, 0, 0, 8), Utc::now());
        h.known = true;
        h.ports = ports;
        h
    }

    fn eval(rule: &dyn Rule, host: &HostRecord, ctx: &ClassifyContext) -> Vec<Draft> {
        let kb = ServiceKnowledgeBase::standard();
        rule.evaluate(host, &RuleEnv { ctx, kb: &kb })
    }

    #[test]
    fn database_rule_fires_per_port() {
        let ctx = ClassifyContext::new(Utc::now());
        let h = host(vec![
            PortRecord::open(5432, "postgresql"),
            PortRecord::open(6379, "redis"),
            PortRecord::closed(3306, "mysql"),
        ]);
        let drafts = eval(&DATABASE, &h, &ctx);
        let ports: Vec<_> = drafts.iter().filter_map(|d| d.port).collect();
        assert_eq!(ports, vec![5432, 6379]);
    }

    #[test]
    fn backdoor_banner_matches_case_insensitively() {
        let ctx = ClassifyContext::new(Utc::now());
        let h = host(vec![PortRecord::open(21, "ftp").with_banner("220 (vsFTPd 2.3.4)")]);
        let drafts = eval(&BackdoorBannerRule, &h, &ctx);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].severity, Severity::Critical);

        let clean = host(vec![PortRecord::open(21, "ftp").with_banner("220 (vsFTPd 3.0.5)")]);
        assert!(eval(&BackdoorBannerRule, &clean, &ctx).is_empty());
    }

    #[test]
    fn banner_rule_skips_without_banner() {
        let ctx = ClassifyContext::new(Utc::now());
        let h = host(vec![PortRecord::open(21, "ftp")]);
        assert!(eval(&BackdoorBannerRule, &h, &ctx).is_empty());
    }

    #[test]
    fn backdoor_port_uses_knowledge_base() {
        let ctx = ClassifyContext::new(Utc::now());
        let h = host(vec![PortRecord::open(31337, "unknown"), PortRecord::open(22, "ssh")]);
        let drafts = eval(&BackdoorPortRule, &h, &ctx);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].port, Some(31337));
    }

    #[test]
    fn plaintext_web_needs_missing_secure_port() {
        let ctx = ClassifyContext::new(Utc::now());
        let both = host(vec![PortRecord::open(80, "http"), PortRecord::open(443, "https")]);
        assert!(eval(&PlaintextWebAdminRule, &both, &ctx).is_empty());

        let plain = host(vec![PortRecord::open(80, "http"), PortRecord::open(8080, "http")]);
        let ports: Vec<_> = eval(&PlaintextWebAdminRule, &plain, &ctx)
            .iter()
            .filter_map(|d| d.port)
            .collect();
        assert_eq!(ports, vec![80, 8080]);
    }

    #[test]
    fn ai_endpoint_split_by_authorization() {
        let ctx = ClassifyContext::new(Utc::now()).with_authorized_ai(["10.0.0.8:11434"]);
        let h = host(vec![PortRecord::open(11434, "unknown"), PortRecord::open(7860, "unknown")]);

        let unauthorized = eval(&AiEndpointRule { authorized: false }, &h, &ctx);
        assert_eq!(unauthorized.len(), 1);
        assert_eq!(unauthorized[0].port, Some(7860));
        assert_eq!(unauthorized[0].severity, Severity::High);

        let authorized = eval(&AiEndpointRule { authorized: true }, &h, &ctx);
        assert_eq!(authorized.len(), 1);
        assert_eq!(authorized[0].port, Some(11434));
        assert_eq!(authorized[0].severity, Severity::Info);
    }

    #[test]
    fn rogue_device_respects_window_and_known_flag() {
        let now = Utc::now();
        let ctx = ClassifyContext::new(now);

        let mut fresh = host(Vec::new());
        fresh.known = false;
        fresh.first_seen = now - Duration::hours(2);
        assert_eq!(eval(&RogueDeviceRule, &fresh, &ctx).len(), 1);

        let mut old = fresh.clone();
        old.first_seen = now - Duration::hours(48);
        assert!(eval(&RogueDeviceRule, &old, &ctx).is_empty());

        fresh.known = true;
        assert!(eval(&RogueDeviceRule, &fresh, &ctx).is_empty());
    }

    #[test]
    fn locally_administered_bit() {
        assert_eq!(is_locally_administered("02:00:00:00:00:01"), Some(true));
        assert_eq!(is_locally_administered("da-a1-19-00-00-01"), Some(true));
        assert_eq!(is_locally_administered("00:1A:2B:3C:4D:5E"), Some(false));
        assert_eq!(is_locally_administered("zz"), None);
    }

    #[test]
    fn threshold_rules() {
        let ctx = ClassifyContext::new(Utc::now());
        let many = host((1..=11).map(|p| PortRecord::open(9000 + p, "unknown")).collect());
        assert_eq!(eval(&LargeAttackSurfaceRule, &many, &ctx).len(), 1);
        let ten = host((1..=10).map(|p| PortRecord::open(9000 + p, "unknown")).collect());
        assert!(eval(&LargeAttackSurfaceRule, &ten, &ctx).is_empty());

        let hub = host(vec![
            PortRecord::open(1883, "mqtt"),
            PortRecord::open(8123, "http"),
            PortRecord::open(6053, "unknown"),
        ]);
        let drafts = eval(&IotClusterRule, &hub, &ctx);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].port, None);
    }
}
