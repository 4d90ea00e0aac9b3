//! TCP connect port scanner.
//!
//! Ports on one host are probed one at a time with a short pause between
//! them. Refused, timed out, and errored connects are all reported as
//! closed/filtered; only a completed handshake counts as open.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use lanwarden_core::services::UNKNOWN_LABEL;
use lanwarden_core::types::PortRecord;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::config::DiscoverConfig;

/// Longest banner kept, in bytes.
pub const MAX_BANNER_LEN: usize = 256;

/// Result of one connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Open,
    Closed,
    Timeout,
    Error,
}

impl ProbeOutcome {
    pub fn is_open(&self) -> bool {
        matches!(self, ProbeOutcome::Open)
    }
}

#[derive(Debug, Clone)]
pub struct PortScanConfig {
    pub connect_timeout: Duration,
    pub inter_port_delay: Duration,
    /// Banner read deadline; `None` disables banner grabbing.
    pub banner_timeout: Option<Duration>,
}

impl Default for PortScanConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(500),
            inter_port_delay: Duration::from_millis(20),
            banner_timeout: Some(Duration::from_millis(300)),
        }
    }
}

impl From<&DiscoverConfig> for PortScanConfig {
    fn from(config: &DiscoverConfig) -> Self {
        Self {
            connect_timeout: config.port_timeout(),
            inter_port_delay: config.inter_port_delay(),
            banner_timeout: config.banner_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PortScanner {
    config: PortScanConfig,
}

impl PortScanner {
    pub fn new(config: PortScanConfig) -> Self {
        Self { config }
    }

    /// One connect attempt. The stream is returned for open ports so the
    /// caller can read a banner from it.
    pub async fn probe(&self, address: Ipv4Addr, port: u16) -> (ProbeOutcome, Option<TcpStream>) {
        let addr = SocketAddr::from((address, port));
        match timeout(self.config.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => (ProbeOutcome::Open, Some(stream)),
            Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => (ProbeOutcome::Closed, None),
            Ok(Err(e)) => {
                tracing::trace!(host = %address, port, error = %e, "Connect failed");
                (ProbeOutcome::Error, None)
            }
            Err(_) => (ProbeOutcome::Timeout, None),
        }
    }

    /// Scan `ports` on one host, in order. Port 0 is skipped. Stops early
    /// when `cancel` fires, returning the ports probed so far.
    pub async fn scan_host(
        &self,
        address: Ipv4Addr,
        ports: &[u16],
        cancel: &CancellationToken,
    ) -> Vec<PortRecord> {
        let mut records = Vec::with_capacity(ports.len());

        for (i, &port) in ports.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::debug!(host = %address, scanned = records.len(), "Port scan cancelled");
                break;
            }
            if port == 0 {
                tracing::warn!(host = %address, "Port 0 is not scannable, skipping");
                continue;
            }
            if i > 0 && !self.config.inter_port_delay.is_zero() {
                tokio::time::sleep(self.config.inter_port_delay).await;
            }

            let (outcome, stream) = self.probe(address, port).await;
            let record = match (outcome, stream) {
                (ProbeOutcome::Open, Some(stream)) => {
                    let banner = match self.config.banner_timeout {
                        Some(limit) => grab_banner(stream, port, limit).await,
                        None => None,
                    };
                    let label = coarse_label(port, banner.as_deref());
                    let record = PortRecord::open(port, label);
                    match banner {
                        Some(banner) => record.with_banner(banner),
                        None => record,
                    }
                }
                _ => PortRecord::closed(port, coarse_label(port, None)),
            };
            records.push(record);
        }

        let open = records.iter().filter(|r| r.is_open()).count();
        tracing::debug!(host = %address, ports = records.len(), open, "Host port scan complete");
        records
    }
}

/// Ports that only talk after the client does.
const HTTP_PORTS: &[u16] = &[80, 3000, 8000, 8008, 8080, 8123, 8888];

/// Read the first line the service sends. HTTP ports get a HEAD request
/// first. Returns `None` on silence, error, or timeout.
async fn grab_banner(mut stream: TcpStream, port: u16, limit: Duration) -> Option<String> {
    if HTTP_PORTS.contains(&port) {
        let _ = stream
            .write_all(b"HEAD / HTTP/1.0\r\nHost: localhost\r\n\r\n")
            .await;
    }

    let mut buf = [0u8; 512];
    let n = match timeout(limit, stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => n,
        _ => return None,
    };
    sanitize_banner(&buf[..n])
}

/// First line, printable ASCII only, at most `MAX_BANNER_LEN` bytes.
pub fn sanitize_banner(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let line = text.lines().find(|l| !l.trim().is_empty())?;
    let clean: String = line
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(MAX_BANNER_LEN)
        .collect();
    let clean = clean.trim();
    if clean.is_empty() {
        None
    } else {
        Some(clean.to_string())
    }
}

/// Scanner's own guess at the service. The knowledge base refines it later.
pub fn coarse_label(port: u16, banner: Option<&str>) -> String {
    if let Some(label) = banner.and_then(label_from_banner) {
        return label.to_string();
    }
    let label = match port {
        21 => "ftp",
        22 => "ssh",
        23 => "telnet",
        25 | 587 => "smtp",
        53 => "dns",
        80 | 8000 | 8080 => "http",
        110 => "pop3",
        143 => "imap",
        443 | 8443 => "https",
        445 => "smb",
        3306 => "mysql",
        3389 => "rdp",
        5432 => "postgresql",
        5900 => "vnc",
        6379 => "redis",
        _ => UNKNOWN_LABEL,
    };
    label.to_string()
}

fn label_from_banner(banner: &str) -> Option<&'static str> {
    let upper = banner.to_ascii_uppercase();
    if upper.starts_with("SSH-") {
        Some("ssh")
    } else if upper.starts_with("HTTP/") {
        Some("http")
    } else if upper.starts_with("220") && upper.contains("FTP") {
        Some("ftp")
    } else if upper.starts_with("220") && upper.contains("SMTP") {
        Some("smtp")
    } else if upper.starts_with("+OK") {
        Some("pop3")
    } else if upper.starts_with("* OK") {
        Some("imap")
    } else if upper.starts_with("RFB ") {
        Some("vnc")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    fn fast_scanner(banners: bool) -> PortScanner {
        PortScanner::new(PortScanConfig {
            connect_timeout: Duration::from_millis(500),
            inter_port_delay: Duration::ZERO,
            banner_timeout: banners.then(|| Duration::from_millis(300)),
        })
    }

    /// A port that was just bound and released, so nothing listens on it.
    async fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn listening_port_is_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let (outcome, stream) = fast_scanner(false).probe(Ipv4Addr::LOCALHOST, port).await;
        assert_eq!(outcome, ProbeOutcome::Open);
        assert!(stream.is_some());
    }

    #[tokio::test]
    async fn refused_port_is_closed() {
        let port = free_port().await;
        let (outcome, _) = fast_scanner(false).probe(Ipv4Addr::LOCALHOST, port).await;
        assert!(!outcome.is_open());
    }

    #[tokio::test]
    async fn scan_host_reads_banner_and_labels() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open_port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket.write_all(b"SSH-2.0-OpenSSH_9.6\r\n").await;
            }
        });
        let closed_port = free_port().await;

        let records = fast_scanner(true)
            .scan_host(
                Ipv4Addr::LOCALHOST,
                &[open_port, 0, closed_port],
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(records.len(), 2, "port 0 must be skipped");
        assert!(records[0].is_open());
        assert_eq!(records[0].label, "ssh");
        assert_eq!(records[0].banner.as_deref(), Some("SSH-2.0-OpenSSH_9.6"));
        assert!(!records[1].is_open());
    }

    #[tokio::test]
    async fn silent_service_has_no_banner() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((socket, _)) = listener.accept().await {
                tokio::time::sleep(Duration::from_secs(2)).await;
                drop(socket);
            }
        });

        let records = fast_scanner(true)
            .scan_host(Ipv4Addr::LOCALHOST, &[port], &CancellationToken::new())
            .await;
        assert!(records[0].is_open());
        assert_eq!(records[0].banner, None);
    }

    #[tokio::test]
    async fn cancelled_scan_returns_partial() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let records = fast_scanner(false)
            .scan_host(Ipv4Addr::LOCALHOST, &[1, 2, 3], &cancel)
            .await;
        assert!(records.is_empty());
    }

    #[test]
    fn banner_sanitised_and_truncated() {
        assert_eq!(
            sanitize_banner(b"\r\n220 \x1b[1mFTP\x07 ready\r\nsecond line"),
            Some("220 [1mFTP ready".to_string())
        );
        let long = vec![b'A'; 1000];
        assert_eq!(sanitize_banner(&long).unwrap().len(), MAX_BANNER_LEN);
        assert_eq!(sanitize_banner(b"\x00\x01\x02"), None);
    }

    #[test]
    fn labels_prefer_banner_over_port() {
        assert_eq!(coarse_label(2222, Some("SSH-2.0-dropbear")), "ssh");
        assert_eq!(coarse_label(21, Some("220 ProFTPD Server")), "ftp");
        assert_eq!(coarse_label(22, None), "ssh");
        assert_eq!(coarse_label(40000, None), "unknown");
    }
}
