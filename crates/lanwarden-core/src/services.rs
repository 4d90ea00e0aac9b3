//! Static service knowledge base.
//!
//! Maps a port number to a named service. Several tables overlap; they are
//! consulted in a fixed precedence and the first hit wins:
//!
//! 1. domain-specific tables (home automation, then AI inference)
//! 2. the generic well-known ports table
//! 3. a fallback built from the scanner's coarse label

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Transport;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceCategory {
    Web,
    RemoteAccess,
    FileTransfer,
    Database,
    Mail,
    Directory,
    Messaging,
    Iot,
    HomeAutomation,
    AiInference,
    Backdoor,
    Infrastructure,
    Media,
    Printing,
    Other,
}

impl ServiceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceCategory::Web => "web",
            ServiceCategory::RemoteAccess => "remote-access",
            ServiceCategory::FileTransfer => "file-transfer",
            ServiceCategory::Database => "database",
            ServiceCategory::Mail => "mail",
            ServiceCategory::Directory => "directory",
            ServiceCategory::Messaging => "messaging",
            ServiceCategory::Iot => "iot",
            ServiceCategory::HomeAutomation => "home-automation",
            ServiceCategory::AiInference => "ai-inference",
            ServiceCategory::Backdoor => "backdoor",
            ServiceCategory::Infrastructure => "infrastructure",
            ServiceCategory::Media => "media",
            ServiceCategory::Printing => "printing",
            ServiceCategory::Other => "other",
        }
    }
}

impl fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which table answered a lookup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceSource {
    HomeAutomation,
    AiInference,
    WellKnown,
    ScannerLabel,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: Cow<'static, str>,
    pub description: Cow<'static, str>,
    pub category: ServiceCategory,
    pub protocol: Transport,
    pub source: ServiceSource,
}

/// A static port → service table.
pub struct ServiceTable {
    pub source: ServiceSource,
    entries: &'static [Entry],
}

struct Entry {
    port: u16,
    name: &'static str,
    description: &'static str,
    category: ServiceCategory,
}

const fn e(port: u16, name: &'static str, description: &'static str, category: ServiceCategory) -> Entry {
    Entry {
        port,
        name,
        description,
        category,
    }
}

impl ServiceTable {
    pub fn get(&self, port: u16) -> Option<ServiceInfo> {
        self.entries.iter().find(|entry| entry.port == port).map(|entry| ServiceInfo {
            name: Cow::Borrowed(entry.name),
            description: Cow::Borrowed(entry.description),
            category: entry.category,
            protocol: Transport::Tcp,
            source: self.source,
        })
    }

    pub fn ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.entries.iter().map(|entry| entry.port)
    }
}

use ServiceCategory::*;

pub static HOME_AUTOMATION: ServiceTable = ServiceTable {
    source: ServiceSource::HomeAutomation,
    entries: &[
        e(1400, "sonos", "Sonos speaker control API", HomeAutomation),
        e(1883, "mqtt", "MQTT broker for home automation hubs", HomeAutomation),
        e(5540, "matter", "Matter smart-home commissioning", HomeAutomation),
        e(6053, "esphome", "ESPHome native device API", HomeAutomation),
        e(6668, "tuya", "Tuya smart device local control", HomeAutomation),
        e(8008, "chromecast", "Google Cast HTTP endpoint", HomeAutomation),
        e(8009, "chromecast-tls", "Google Cast control channel", HomeAutomation),
        e(8123, "home-assistant", "Home Assistant web interface", HomeAutomation),
        e(8883, "mqtt-tls", "MQTT over TLS for home automation hubs", HomeAutomation),
        e(21064, "homekit", "HomeKit accessory protocol bridge", HomeAutomation),
        e(51826, "homebridge", "Homebridge HomeKit bridge", HomeAutomation),
        e(55443, "yeelight", "Yeelight LAN control", HomeAutomation),
    ],
};

pub static AI_INFERENCE: ServiceTable = ServiceTable {
    source: ServiceSource::AiInference,
    entries: &[
        e(1234, "lm-studio", "LM Studio local inference server", AiInference),
        e(4891, "gpt4all", "GPT4All API server", AiInference),
        e(5001, "koboldcpp", "KoboldCpp inference server", AiInference),
        e(6333, "qdrant", "Qdrant vector database", AiInference),
        e(7860, "gradio", "Gradio / text-generation-webui", AiInference),
        e(8188, "comfyui", "ComfyUI image generation server", AiInference),
        e(8265, "ray-dashboard", "Ray cluster dashboard", AiInference),
        e(11434, "ollama", "Ollama LLM inference API", AiInference),
        e(19530, "milvus", "Milvus vector database", AiInference),
    ],
};

pub static WELL_KNOWN: ServiceTable = ServiceTable {
    source: ServiceSource::WellKnown,
    entries: &[
        e(19, "chargen", "Character generator", Infrastructure),
        e(20, "ftp-data", "FTP data channel", FileTransfer),
        e(21, "ftp", "File Transfer Protocol", FileTransfer),
        e(22, "ssh", "Secure Shell", RemoteAccess),
        e(23, "telnet", "Telnet remote shell", RemoteAccess),
        e(25, "smtp", "Simple Mail Transfer Protocol", Mail),
        e(53, "dns", "Domain Name System", Infrastructure),
        e(80, "http", "Hypertext Transfer Protocol", Web),
        e(110, "pop3", "Post Office Protocol v3", Mail),
        e(111, "rpcbind", "ONC RPC port mapper", Infrastructure),
        e(135, "msrpc", "Microsoft RPC endpoint mapper", Infrastructure),
        e(139, "netbios-ssn", "NetBIOS session service", FileTransfer),
        e(143, "imap", "Internet Message Access Protocol", Mail),
        e(161, "snmp", "Simple Network Management Protocol", Infrastructure),
        e(389, "ldap", "Lightweight Directory Access Protocol", Directory),
        e(443, "https", "HTTP over TLS", Web),
        e(445, "microsoft-ds", "SMB file sharing", FileTransfer),
        e(465, "smtps", "SMTP over TLS", Mail),
        e(515, "printer", "Line printer daemon", Printing),
        e(548, "afp", "Apple Filing Protocol", FileTransfer),
        e(554, "rtsp", "Real Time Streaming Protocol", Media),
        e(587, "submission", "Mail submission", Mail),
        e(631, "ipp", "Internet Printing Protocol", Printing),
        e(636, "ldaps", "LDAP over TLS", Directory),
        e(873, "rsync", "rsync file synchronisation", FileTransfer),
        e(993, "imaps", "IMAP over TLS", Mail),
        e(995, "pop3s", "POP3 over TLS", Mail),
        e(1243, "subseven", "SubSeven trojan", Backdoor),
        e(1337, "waste", "Common backdoor listener", Backdoor),
        e(1433, "mssql", "Microsoft SQL Server", Database),
        e(1521, "oracle", "Oracle TNS listener", Database),
        e(1723, "pptp", "PPTP VPN", RemoteAccess),
        e(1883, "mqtt", "MQTT message broker", Messaging),
        e(1900, "ssdp", "SSDP / UPnP discovery", Iot),
        e(2049, "nfs", "Network File System", FileTransfer),
        e(2375, "docker", "Docker Engine API (plaintext)", Infrastructure),
        e(2376, "docker-tls", "Docker Engine API over TLS", Infrastructure),
        e(2379, "etcd", "etcd client API", Database),
        e(3000, "http-dev", "Development web server", Web),
        e(3306, "mysql", "MySQL database", Database),
        e(3389, "rdp", "Remote Desktop Protocol", RemoteAccess),
        e(4444, "metasploit", "Metasploit default listener", Backdoor),
        e(5000, "upnp", "UPnP device control", Iot),
        e(5432, "postgresql", "PostgreSQL database", Database),
        e(5554, "sasser", "Sasser worm FTP server", Backdoor),
        e(5900, "vnc", "Virtual Network Computing", RemoteAccess),
        e(5901, "vnc-1", "VNC display :1", RemoteAccess),
        e(5902, "vnc-2", "VNC display :2", RemoteAccess),
        e(5984, "couchdb", "CouchDB database", Database),
        e(6379, "redis", "Redis key-value store", Database),
        e(6667, "irc", "Internet Relay Chat", Messaging),
        e(7474, "neo4j", "Neo4j browser", Database),
        e(8000, "http-alt", "Alternate HTTP", Web),
        e(8080, "http-proxy", "Alternate HTTP / proxy", Web),
        e(8443, "https-alt", "Alternate HTTPS", Web),
        e(8883, "secure-mqtt", "MQTT over TLS", Messaging),
        e(8888, "http-alt2", "Alternate HTTP", Web),
        e(9042, "cassandra", "Cassandra native protocol", Database),
        e(9100, "jetdirect", "Raw printing", Printing),
        e(9200, "elasticsearch", "Elasticsearch REST API", Database),
        e(10250, "kubelet", "Kubernetes kubelet API", Infrastructure),
        e(11211, "memcached", "Memcached", Database),
        e(12345, "netbus", "NetBus trojan", Backdoor),
        e(20034, "netbus2", "NetBus 2 Pro trojan", Backdoor),
        e(27017, "mongodb", "MongoDB database", Database),
        e(27374, "subseven-2", "SubSeven 2.x trojan", Backdoor),
        e(31337, "back-orifice", "Back Orifice trojan", Backdoor),
        e(49152, "upnp-alt", "UPnP device control", Iot),
        e(54320, "bo2k", "Back Orifice 2000", Backdoor),
    ],
};

/// Precedence-ordered set of tables.
pub struct ServiceKnowledgeBase {
    tables: Vec<&'static ServiceTable>,
}

impl ServiceKnowledgeBase {
    /// Home automation > AI inference > well-known.
    pub fn standard() -> Self {
        Self {
            tables: vec![&HOME_AUTOMATION, &AI_INFERENCE, &WELL_KNOWN],
        }
    }

    /// Look up a port. `coarse_label` is the scanner's label and is only
    /// used when no table knows the port.
    pub fn lookup(&self, port: u16, coarse_label: Option<&str>) -> Option<ServiceInfo> {
        for table in &self.tables {
            if let Some(info) = table.get(port) {
                return Some(info);
            }
        }

        let label = coarse_label?.trim();
        if label.is_empty() || label == UNKNOWN_LABEL {
            return None;
        }
        Some(ServiceInfo {
            name: Cow::Owned(label.to_string()),
            description: Cow::Owned(format!("{label} (scanner label)")),
            category: category_for_label(label),
            protocol: Transport::Tcp,
            source: ServiceSource::ScannerLabel,
        })
    }

    pub fn category(&self, port: u16, coarse_label: Option<&str>) -> Option<ServiceCategory> {
        self.lookup(port, coarse_label).map(|info| info.category)
    }
}

impl Default for ServiceKnowledgeBase {
    fn default() -> Self {
        Self::standard()
    }
}

/// Label the scanner assigns when it has nothing better.
pub const UNKNOWN_LABEL: &str = "unknown";

fn category_for_label(label: &str) -> ServiceCategory {
    match label {
        "http" | "https" => Web,
        "ssh" | "telnet" | "rdp" | "vnc" => RemoteAccess,
        "ftp" => FileTransfer,
        "smtp" | "pop3" | "imap" => Mail,
        "mysql" | "postgresql" | "redis" => Database,
        _ => Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_table_wins_over_well_known() {
        let kb = ServiceKnowledgeBase::standard();
        let info = kb.lookup(1883, Some("unknown")).unwrap();
        assert_eq!(info.source, ServiceSource::HomeAutomation);
        assert_eq!(info.category, ServiceCategory::HomeAutomation);
    }

    #[test]
    fn well_known_used_when_no_domain_entry() {
        let kb = ServiceKnowledgeBase::standard();
        let info = kb.lookup(3306, None).unwrap();
        assert_eq!(info.name, "mysql");
        assert_eq!(info.source, ServiceSource::WellKnown);
        assert_eq!(info.category, ServiceCategory::Database);
    }

    #[test]
    fn ai_table_checked_before_well_known() {
        let kb = ServiceKnowledgeBase::standard();
        let info = kb.lookup(11434, None).unwrap();
        assert_eq!(info.name, "ollama");
        assert_eq!(info.category, ServiceCategory::AiInference);
    }

    #[test]
    fn table_hit_ignores_scanner_label() {
        let kb = ServiceKnowledgeBase::standard();
        let info = kb.lookup(22, Some("http")).unwrap();
        assert_eq!(info.name, "ssh");
    }

    #[test]
    fn falls_back_to_scanner_label() {
        let kb = ServiceKnowledgeBase::standard();
        let info = kb.lookup(2222, Some("ssh")).unwrap();
        assert_eq!(info.source, ServiceSource::ScannerLabel);
        assert_eq!(info.category, ServiceCategory::RemoteAccess);
    }

    #[test]
    fn unknown_port_without_label_is_none() {
        let kb = ServiceKnowledgeBase::standard();
        assert!(kb.lookup(40000, None).is_none());
        assert!(kb.lookup(40000, Some(UNKNOWN_LABEL)).is_none());
    }

    #[test]
    fn tables_have_no_duplicate_ports() {
        for table in [&HOME_AUTOMATION, &AI_INFERENCE, &WELL_KNOWN] {
            let mut ports: Vec<u16> = table.ports().collect();
            let len = ports.len();
            ports.sort_unstable();
            ports.dedup();
            assert_eq!(ports.len(), len);
        }
    }
}
