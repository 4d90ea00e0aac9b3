//! Host reachability sweep over ICMP echo.
//!
//! Each probe is a blocking socket exchange run on the blocking pool. A
//! semaphore caps how many run at once; `host_concurrency = 1` probes hosts
//! strictly one after another.

use std::io;
use std::mem::MaybeUninit;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::icmp;
use crate::progress::{ProgressReporter, ScanPhase};

/// One liveness check against one address. Blocking.
pub trait Pinger: Send + Sync {
    /// `Ok(true)` if a matching reply arrived before `timeout`.
    fn ping(&self, target: Ipv4Addr, seq: u16, timeout: Duration) -> io::Result<bool>;
}

/// Unprivileged ICMP datagram socket first, raw socket second.
pub struct IcmpPinger {
    ident: u16,
}

impl Default for IcmpPinger {
    fn default() -> Self {
        Self {
            ident: icmp::process_ident(),
        }
    }
}

impl IcmpPinger {
    fn open_socket() -> io::Result<Socket> {
        match Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4)) {
            Ok(socket) => Ok(socket),
            Err(dgram_err) => {
                tracing::trace!(error = %dgram_err, "ICMP datagram socket unavailable, trying raw");
                Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
            }
        }
    }
}

impl Pinger for IcmpPinger {
    fn ping(&self, target: Ipv4Addr, seq: u16, timeout: Duration) -> io::Result<bool> {
        let socket = Self::open_socket()?;
        socket.set_write_timeout(Some(timeout))?;

        let packet = icmp::echo_request(self.ident, seq);
        socket.send_to(&packet, &SockAddr::from(SocketAddrV4::new(target, 0)))?;

        let deadline = Instant::now() + timeout;
        let mut buf = [MaybeUninit::<u8>::uninit(); 1500];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            socket.set_read_timeout(Some(remaining))?;

            match socket.recv_from(&mut buf) {
                Ok((n, from)) => {
                    // Safety: recv_from initialized the first `n` bytes.
                    let bytes = unsafe { std::slice::from_raw_parts(buf.as_ptr() as *const u8, n) };
                    if from.as_socket_ipv4().map(|a| *a.ip()) != Some(target) {
                        continue;
                    }
                    // Datagram sockets rewrite the identifier, so match on sequence.
                    if let Some(reply) = icmp::parse_reply(bytes) {
                        if reply.seq == seq {
                            return Ok(true);
                        }
                    }
                }
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    return Ok(false);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// Outcome of a sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepResult {
    /// Addresses that answered, ascending.
    pub alive: Vec<Ipv4Addr>,
    /// Hosts actually probed (fewer than the target count when cancelled).
    pub probed: usize,
    pub cancelled: bool,
}

pub struct HostProber {
    pinger: Arc<dyn Pinger>,
    timeout: Duration,
    concurrency: usize,
}

impl HostProber {
    pub fn new(pinger: Arc<dyn Pinger>, timeout: Duration, concurrency: usize) -> Self {
        Self {
            pinger,
            timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Probe every target. Per-host failures (socket creation, send errors)
    /// count as not alive and never abort the sweep.
    pub async fn sweep(
        &self,
        targets: &[Ipv4Addr],
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> SweepResult {
        progress.begin(ScanPhase::Discovery, targets.len());
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (i, &target) in targets.iter().enumerate() {
            let semaphore = semaphore.clone();
            let pinger = self.pinger.clone();
            let cancel = cancel.clone();
            let timeout = self.timeout;
            let seq = (i as u16).wrapping_add(1);

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (target, None);
                };
                if cancel.is_cancelled() {
                    return (target, None);
                }
                let alive = tokio::task::spawn_blocking(move || pinger.ping(target, seq, timeout))
                    .await
                    .unwrap_or_else(|e| Err(io::Error::new(io::ErrorKind::Other, e)));
                match alive {
                    Ok(alive) => (target, Some(alive)),
                    Err(e) => {
                        tracing::debug!(host = %target, error = %e, "Probe failed, treating as down");
                        (target, Some(false))
                    }
                }
            });
        }

        let mut result = SweepResult::default();
        while let Some(joined) = tasks.join_next().await {
            let Ok((target, outcome)) = joined else {
                continue;
            };
            let Some(alive) = outcome else {
                continue;
            };
            result.probed += 1;
            if alive {
                result.alive.push(target);
            }
            progress.advance(Some(target.to_string()));
        }

        result.alive.sort();
        result.cancelled = cancel.is_cancelled() && result.probed < targets.len();

        tracing::info!(
            targets = targets.len(),
            probed = result.probed,
            hosts_up = result.alive.len(),
            cancelled = result.cancelled,
            "Liveness sweep complete"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Answers for a fixed set of addresses.
    struct FakePinger {
        up: HashSet<Ipv4Addr>,
        calls: AtomicUsize,
    }

    impl FakePinger {
        fn new(up: &[Ipv4Addr]) -> Self {
            Self {
                up: up.iter().copied().collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Pinger for FakePinger {
        fn ping(&self, target: Ipv4Addr, _seq: u16, _timeout: Duration) -> io::Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if target.octets()[3] == 13 {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "no raw sockets"));
            }
            Ok(self.up.contains(&target))
        }
    }

    fn targets(n: u8) -> Vec<Ipv4Addr> {
        (1..=n).map(|i| Ipv4Addr::new(10, 9, 0, i)).collect()
    }

    #[tokio::test]
    async fn sweep_reports_responders_sorted() {
        let up = [Ipv4Addr::new(10, 9, 0, 20), Ipv4Addr::new(10, 9, 0, 3)];
        let prober = HostProber::new(Arc::new(FakePinger::new(&up)), Duration::from_millis(10), 8);
        let progress = ProgressReporter::new();

        let result = prober
            .sweep(&targets(30), &CancellationToken::new(), &progress)
            .await;

        assert_eq!(result.alive, vec![Ipv4Addr::new(10, 9, 0, 3), Ipv4Addr::new(10, 9, 0, 20)]);
        assert_eq!(result.probed, 30);
        assert!(!result.cancelled);
        assert_eq!(progress.snapshot().fraction, 1.0);
    }

    #[tokio::test]
    async fn probe_errors_count_as_down() {
        let up = [Ipv4Addr::new(10, 9, 0, 13)];
        let prober = HostProber::new(Arc::new(FakePinger::new(&up)), Duration::from_millis(10), 1);
        let result = prober
            .sweep(&targets(20), &CancellationToken::new(), &ProgressReporter::new())
            .await;
        assert!(result.alive.is_empty());
        assert_eq!(result.probed, 20);
    }

    #[tokio::test]
    async fn cancelled_sweep_stops_probing() {
        let pinger = Arc::new(FakePinger::new(&[]));
        let prober = HostProber::new(pinger.clone(), Duration::from_millis(10), 4);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = prober
            .sweep(&targets(50), &cancel, &ProgressReporter::new())
            .await;

        assert!(result.cancelled);
        assert_eq!(result.probed, 0);
        assert_eq!(pinger.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreachable_subnet_completes_empty() {
        // TEST-NET-1 never answers. Socket errors in a sandbox also count as down.
        let hosts: Vec<Ipv4Addr> = crate::enumerate::enumerate_targets("192.0.2.0/24").unwrap();
        let prober = HostProber::new(Arc::new(IcmpPinger::default()), Duration::from_millis(50), 64);

        let result = tokio::time::timeout(
            Duration::from_secs(30),
            prober.sweep(&hosts, &CancellationToken::new(), &ProgressReporter::new()),
        )
        .await
        .expect("sweep stalled");

        assert!(result.alive.is_empty());
        assert_eq!(result.probed, 254);
    }
}
