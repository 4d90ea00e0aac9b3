//! One scan cycle, end to end.
//!
//! enumerate → sweep → port scan → relabel → merge → classify → diff →
//! swap snapshots → publish events.
//!
//! A cancelled cycle stops between units of work and returns what it has.
//! It never diffs or swaps snapshots, so the next full cycle still compares
//! against the last complete observation.

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use lanwarden_classify::{ClassificationEngine, ClassifyContext, RiskSummary};
use lanwarden_core::events::{EventPayload, ScanEvent};
use lanwarden_core::services::{ServiceCategory, ServiceKnowledgeBase};
use lanwarden_core::types::{
    parse_service_key, service_key, ChangeEvent, Finding, HostRecord, PortRecord, ScanId, ServiceFingerprint,
};
use lanwarden_diff::{ai, anomaly, inventory as inventory_diff};
use lanwarden_diff::{AiServiceDetector, AnomalyDetector, DiffReport, InventoryDetector, Snapshot};
use lanwarden_store::{SnapshotCell, SnapshotStore, StoreError};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::{DiscoverConfig, ScanTier};
use crate::enumerate::enumerate_targets;
use crate::error::{DiscoverError, Result};
use crate::inventory::{Inventory, KnownDevices, MergeSummary};
use crate::neighbors;
use crate::notify::{EventSink, TracingSink};
use crate::portscan::{PortScanConfig, PortScanner};
use crate::prober::{HostProber, IcmpPinger, Pinger};
use crate::progress::{ProgressReporter, ScanPhase, ScanProgress};

/// Snapshot names in the store.
pub const INVENTORY_SNAPSHOT: &str = "inventory";
pub const AI_SERVICES_SNAPSHOT: &str = "ai-services";

/// What to scan. Unset overrides fall back to the configuration.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub target: String,
    pub tier: ScanTier,
    /// Explicit port list; replaces the tier's ports.
    pub ports: Option<Vec<u16>>,
    pub liveness_timeout: Option<Duration>,
    pub port_timeout: Option<Duration>,
}

impl ScanRequest {
    pub fn new(target: impl Into<String>, tier: ScanTier) -> Self {
        Self {
            target: target.into(),
            tier,
            ports: None,
            liveness_timeout: None,
            port_timeout: None,
        }
    }

    pub fn with_ports(mut self, ports: Vec<u16>) -> Self {
        self.ports = Some(ports);
        self
    }

    pub fn with_liveness_timeout(mut self, timeout: Duration) -> Self {
        self.liveness_timeout = Some(timeout);
        self
    }

    pub fn with_port_timeout(mut self, timeout: Duration) -> Self {
        self.port_timeout = Some(timeout);
        self
    }
}

/// Everything one cycle produced.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub scan_id: ScanId,
    pub target: String,
    pub tier: ScanTier,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub hosts_targeted: usize,
    pub hosts_probed: usize,
    pub ports_per_host: usize,
    /// Hosts that answered this cycle, with their merged inventory state.
    pub hosts: Vec<HostRecord>,
    pub findings: Vec<Finding>,
    pub risk: RiskSummary,
    pub merge: Option<MergeSummary>,
    /// All change events, inventory then AI services then anomaly.
    pub changes: Vec<ChangeEvent>,
    pub diffs: Vec<DiffReport>,
    pub cancelled: bool,
    /// Snapshot persistence failures. The cycle's results stand regardless.
    pub store_errors: Vec<String>,
}

pub struct ScanOrchestrator {
    config: DiscoverConfig,
    store: Arc<dyn SnapshotStore>,
    pinger: Arc<dyn Pinger>,
    sink: Arc<dyn EventSink>,
    classifier: ClassificationEngine,
    inventory_detector: InventoryDetector,
    anomaly_detector: AnomalyDetector,
    ai_detector: AiServiceDetector,
    known: KnownDevices,
    authorized_ai: Vec<String>,
    inventory: SnapshotCell<Inventory>,
    ai_services: SnapshotCell<Snapshot<ServiceFingerprint>>,
    progress: ProgressReporter,
    arp_table: Option<PathBuf>,
}

impl ScanOrchestrator {
    /// Load the previous snapshots from `store`. A missing snapshot is a
    /// first run; a corrupt one is an error.
    pub fn new(config: DiscoverConfig, store: Arc<dyn SnapshotStore>) -> Result<Self> {
        let inventory = SnapshotCell::load(INVENTORY_SNAPSHOT, store.as_ref())?;
        let ai_services = SnapshotCell::load(AI_SERVICES_SNAPSHOT, store.as_ref())?;
        let known = KnownDevices::from_entries(&config.known_devices);
        let authorized_ai = authorized_service_keys(&config.authorized_ai_services);

        Ok(Self {
            classifier: ClassificationEngine::new(ServiceKnowledgeBase::standard()),
            inventory_detector: InventoryDetector::new(ServiceKnowledgeBase::standard()),
            anomaly_detector: AnomalyDetector::new(
                ServiceKnowledgeBase::standard(),
                config.anomaly_burst_threshold,
            ),
            ai_detector: AiServiceDetector,
            known,
            authorized_ai,
            inventory,
            ai_services,
            store,
            pinger: Arc::new(IcmpPinger::default()),
            sink: Arc::new(TracingSink),
            progress: ProgressReporter::new(),
            arp_table: Some(PathBuf::from(neighbors::ARP_TABLE)),
            config,
        })
    }

    pub fn with_pinger(mut self, pinger: Arc<dyn Pinger>) -> Self {
        self.pinger = pinger;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Where to read MAC addresses from; `None` disables the lookup.
    pub fn with_arp_table(mut self, path: Option<PathBuf>) -> Self {
        self.arp_table = path;
        self
    }

    pub fn config(&self) -> &DiscoverConfig {
        &self.config
    }

    pub fn progress(&self) -> tokio::sync::watch::Receiver<ScanProgress> {
        self.progress.subscribe()
    }

    /// Last committed inventory.
    pub fn inventory(&self) -> Option<Arc<Inventory>> {
        self.inventory.current()
    }

    /// Last committed AI service snapshot.
    pub fn ai_services(&self) -> Option<Arc<Snapshot<ServiceFingerprint>>> {
        self.ai_services.current()
    }

    /// Run one cycle against `request.target`.
    ///
    /// Fails only on a bad request or a key-scheme mismatch. Per-host and
    /// per-port failures degrade to "not alive" or "closed/filtered".
    pub async fn run_cycle(
        &self,
        request: &ScanRequest,
        cancel: &CancellationToken,
    ) -> Result<CycleReport> {
        let clock = Instant::now();
        let started_at = Utc::now();
        let scan_id = ScanId::new();

        let targets = enumerate_targets(&request.target)?;
        let ports = match &request.ports {
            Some(ports) => ScanTier::Custom.ports(ports),
            None => request.tier.ports(&self.config.custom_ports),
        };
        if ports.is_empty() {
            return Err(DiscoverError::InvalidPorts(format!(
                "tier {} has no ports to scan",
                request.tier
            )));
        }

        tracing::info!(
            scan_id = %scan_id,
            target = %request.target,
            tier = %request.tier,
            hosts = targets.len(),
            ports = ports.len(),
            "Scan cycle starting"
        );
        self.publish(
            scan_id,
            EventPayload::ScanStarted {
                target: request.target.clone(),
                tier: request.tier.to_string(),
                host_count: targets.len() as u32,
            },
        );

        // Liveness.
        let prober = HostProber::new(
            self.pinger.clone(),
            request
                .liveness_timeout
                .unwrap_or_else(|| self.config.liveness_timeout()),
            self.config.workers(),
        );
        let sweep = prober.sweep(&targets, cancel, &self.progress).await;

        // Ports.
        let mut scan_config = PortScanConfig::from(&self.config);
        if let Some(timeout) = request.port_timeout {
            scan_config.connect_timeout = timeout;
        }
        let scanned_ports = if sweep.cancelled {
            BTreeMap::new()
        } else {
            self.scan_ports(&sweep.alive, ports.clone(), PortScanner::new(scan_config), cancel)
                .await
        };

        // Observations → hosts.
        let now = Utc::now();
        let kb = self.classifier.knowledge_base();
        let macs = self
            .arp_table
            .as_ref()
            .map(|path| neighbors::read_arp_cache(path))
            .unwrap_or_default();
        let observed: Vec<HostRecord> = scanned_ports
            .into_iter()
            .map(|(address, mut records)| {
                relabel(kb, &mut records);
                let mut host = HostRecord::discovered(address, now);
                host.ports = records;
                host.mac = macs.get(&address).cloned();
                host
            })
            .collect();
        let observed_addrs: BTreeSet<Ipv4Addr> = observed.iter().map(|h| h.address).collect();

        let cancelled = cancel.is_cancelled();
        let scanned: BTreeSet<Ipv4Addr> = if cancelled {
            observed_addrs.clone()
        } else {
            targets.iter().copied().collect()
        };

        // Merge against the previous inventory. Writers queue here.
        let inventory_writer = self.inventory.writer().await;
        let previous_inventory = inventory_writer.previous();
        let mut inventory = previous_inventory
            .as_deref()
            .cloned()
            .unwrap_or_default();
        let merge = inventory.merge(observed, &scanned, now, &self.known);
        let hosts: Vec<HostRecord> = observed_addrs
            .iter()
            .filter_map(|a| inventory.get(*a).cloned())
            .collect();

        // Classification.
        let ctx = ClassifyContext::new(now)
            .with_authorized_ai(self.authorized_ai.iter().cloned())
            .with_rogue_window(self.config.rogue_window());
        self.progress.begin(ScanPhase::Classification, hosts.len());
        let mut findings = Vec::new();
        for host in &hosts {
            findings.extend(self.classifier.classify(host, &ctx));
            self.progress.advance(Some(host.address.to_string()));
        }
        let risk = RiskSummary::compute(hosts.len(), &findings);

        let mut report = CycleReport {
            scan_id,
            target: request.target.clone(),
            tier: request.tier,
            started_at,
            finished_at: started_at,
            duration_ms: 0,
            hosts_targeted: targets.len(),
            hosts_probed: sweep.probed,
            ports_per_host: ports.len(),
            hosts,
            findings,
            risk,
            merge: None,
            changes: Vec::new(),
            diffs: Vec::new(),
            cancelled,
            store_errors: Vec::new(),
        };

        if cancelled {
            drop(inventory_writer);
            return Ok(self.finish_cancelled(report, clock));
        }

        // Change detection.
        self.progress.begin(ScanPhase::ChangeDetection, 3);
        let previous_hosts = previous_inventory.as_deref().map(|inv| {
            (
                inv.hosts.values().collect::<Vec<_>>(),
                inv.updated_at.unwrap_or(now),
            )
        });

        let inventory_report = self.inventory_detector.detect(
            previous_hosts
                .as_ref()
                .map(|(hosts, at)| inventory_diff::snapshot(hosts.iter().copied(), *at))
                .as_ref(),
            &inventory_diff::snapshot(inventory.hosts.values(), now),
        )?;
        self.progress.advance(Some(inventory_diff::DETECTOR.to_string()));

        let ai_writer = self.ai_services.writer().await;
        let previous_ai = ai_writer.previous();
        let current_ai = ai_fingerprints(
            &report.hosts,
            kb,
            &ctx,
            previous_ai.as_deref(),
            &scanned,
            now,
        );
        let ai_report = self.ai_detector.detect(previous_ai.as_deref(), &current_ai)?;
        self.progress.advance(Some(ai::DETECTOR.to_string()));

        let anomaly_report = self.anomaly_detector.detect(
            previous_hosts
                .as_ref()
                .map(|(hosts, at)| anomaly::snapshot(hosts.iter().copied(), *at))
                .as_ref(),
            &anomaly::snapshot(inventory.hosts.values(), now),
        )?;
        self.progress.advance(Some(anomaly::DETECTOR.to_string()));

        // Swap.
        record_store_error(
            &mut report.store_errors,
            INVENTORY_SNAPSHOT,
            inventory_writer.commit(inventory, self.store.as_ref()),
        );
        record_store_error(
            &mut report.store_errors,
            AI_SERVICES_SNAPSHOT,
            ai_writer.commit(current_ai, self.store.as_ref()),
        );

        report.merge = Some(merge);
        for diff in [inventory_report, ai_report, anomaly_report] {
            report.changes.extend(diff.events.iter().cloned());
            report.diffs.push(diff);
        }

        for finding in &report.findings {
            self.publish(scan_id, EventPayload::FindingRaised(finding.clone()));
        }
        for change in &report.changes {
            self.publish(scan_id, EventPayload::ChangeDetected(change.clone()));
        }

        report.finished_at = Utc::now();
        report.duration_ms = clock.elapsed().as_millis() as u64;
        self.progress.finish(ScanPhase::Complete);
        self.publish(
            scan_id,
            EventPayload::ScanCompleted {
                hosts_alive: report.hosts.len() as u32,
                findings: report.findings.len() as u32,
                changes: report.changes.len() as u32,
                risk_score: report.risk.score,
                duration_ms: report.duration_ms,
            },
        );

        tracing::info!(
            scan_id = %scan_id,
            target = %request.target,
            hosts_up = report.hosts.len(),
            findings = report.findings.len(),
            changes = report.changes.len(),
            risk_score = report.risk.score,
            duration_ms = report.duration_ms,
            "Scan cycle complete"
        );
        Ok(report)
    }

    /// Port-scan every live host, at most `workers` hosts at a time.
    async fn scan_ports(
        &self,
        alive: &[Ipv4Addr],
        ports: Vec<u16>,
        scanner: PortScanner,
        cancel: &CancellationToken,
    ) -> BTreeMap<Ipv4Addr, Vec<PortRecord>> {
        self.progress.begin(ScanPhase::PortScan, alive.len());
        let ports: Arc<[u16]> = ports.into();
        let semaphore = Arc::new(Semaphore::new(self.config.workers()));
        let mut tasks = JoinSet::new();

        for &address in alive {
            let scanner = scanner.clone();
            let ports = ports.clone();
            let cancel = cancel.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (address, None);
                };
                if cancel.is_cancelled() {
                    return (address, None);
                }
                let records = scanner.scan_host(address, &ports, &cancel).await;
                (address, Some(records))
            });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((address, Some(records))) => {
                    self.progress.advance(Some(address.to_string()));
                    results.insert(address, records);
                }
                Ok((_, None)) => {}
                Err(e) => tracing::error!(error = %e, "Port scan task failed"),
            }
        }
        results
    }

    fn finish_cancelled(&self, mut report: CycleReport, clock: Instant) -> CycleReport {
        report.finished_at = Utc::now();
        report.duration_ms = clock.elapsed().as_millis() as u64;
        self.progress.finish(ScanPhase::Cancelled);

        for finding in &report.findings {
            self.publish(report.scan_id, EventPayload::FindingRaised(finding.clone()));
        }
        self.publish(
            report.scan_id,
            EventPayload::ScanCancelled {
                hosts_scanned: report.hosts.len() as u32,
                duration_ms: report.duration_ms,
            },
        );
        tracing::warn!(
            scan_id = %report.scan_id,
            target = %report.target,
            hosts_probed = report.hosts_probed,
            hosts_scanned = report.hosts.len(),
            "Scan cycle cancelled, snapshots left unchanged"
        );
        report
    }

    fn publish(&self, scan_id: ScanId, payload: EventPayload) {
        self.sink.publish(&ScanEvent::new(scan_id, payload));
    }
}

/// Normalised `address:port` keys. Malformed entries are logged and dropped.
fn authorized_service_keys(entries: &[String]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|entry| match parse_service_key(entry) {
            Ok((address, port)) => Some(service_key(address, port)),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring authorized AI service entry");
                None
            }
        })
        .collect()
}

/// Replace scanner labels with knowledge-base names where one is known.
fn relabel(kb: &ServiceKnowledgeBase, records: &mut [PortRecord]) {
    for record in records {
        if let Some(info) = kb.lookup(record.port, Some(record.label.as_str())) {
            record.label = info.name.into_owned();
        }
    }
}

fn record_store_error(
    errors: &mut Vec<String>,
    name: &str,
    result: std::result::Result<Arc<impl Sized>, StoreError>,
) {
    if let Err(e) = result {
        tracing::error!(snapshot = name, error = %e, "Failed to persist snapshot");
        errors.push(format!("{name}: {e}"));
    }
}

/// AI inference endpoints seen on `hosts`, plus previous entries for hosts
/// outside `scanned`. `first_seen` carries over by key; authorization is
/// re-evaluated against `ctx` for every entry.
pub fn ai_fingerprints(
    hosts: &[HostRecord],
    kb: &ServiceKnowledgeBase,
    ctx: &ClassifyContext,
    previous: Option<&Snapshot<ServiceFingerprint>>,
    scanned: &BTreeSet<Ipv4Addr>,
    now: DateTime<Utc>,
) -> Snapshot<ServiceFingerprint> {
    let mut services = Vec::new();

    for host in hosts {
        for port in host.open_ports() {
            let Some(info) = kb.lookup(port.port, Some(port.label.as_str())) else {
                continue;
            };
            if info.category != ServiceCategory::AiInference {
                continue;
            }
            let key = service_key(host.address, port.port);
            let first_seen = previous
                .and_then(|p| p.get(&key))
                .map(|f| f.first_seen)
                .unwrap_or(now);
            services.push(ServiceFingerprint {
                address: host.address,
                port: port.port,
                service_type: info.name.into_owned(),
                version: port.banner.clone(),
                authorized: ctx.is_authorized(host.address, port.port),
                first_seen,
                last_seen: now,
            });
        }
    }

    if let Some(previous) = previous {
        services.extend(
            previous
                .values()
                .filter(|f| !scanned.contains(&f.address))
                .map(|f| ServiceFingerprint {
                    authorized: ctx.is_authorized(f.address, f.port),
                    ..f.clone()
                }),
        );
    }

    ai::snapshot(services, now)
}
