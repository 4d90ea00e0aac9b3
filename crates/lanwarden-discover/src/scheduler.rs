//! Periodic scanning.
//!
//! One tokio task per enabled subnet, each ticking at its own interval.
//! Every cycle runs under a watchdog; a cycle that overruns is cancelled
//! and logged, and the loop carries on with the next tick.

use std::sync::Arc;

use tokio::time::{interval, timeout, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::SubnetSchedule;
use crate::error::{DiscoverError, Result};
use crate::orchestrator::{CycleReport, ScanOrchestrator, ScanRequest};

pub struct ScanScheduler {
    orchestrator: Arc<ScanOrchestrator>,
    shutdown: CancellationToken,
}

impl ScanScheduler {
    pub fn new(orchestrator: Arc<ScanOrchestrator>) -> Self {
        Self {
            orchestrator,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops every subnet loop and cancels in-flight cycles.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until the shutdown token fires.
    pub async fn run(&self) -> Result<()> {
        let mut handles = Vec::new();

        for subnet in &self.orchestrator.config().subnets {
            if !subnet.enabled {
                tracing::info!(cidr = %subnet.cidr, "Subnet disabled, skipping");
                continue;
            }

            let orchestrator = self.orchestrator.clone();
            let subnet = subnet.clone();
            let shutdown = self.shutdown.clone();

            handles.push(tokio::spawn(async move {
                run_subnet_loop(orchestrator, subnet, shutdown).await;
            }));
        }

        if handles.is_empty() {
            return Err(DiscoverError::Config(
                "no enabled subnets configured for daemon mode".to_string(),
            ));
        }

        tracing::info!(subnet_count = handles.len(), "Scheduler started");

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Subnet scan task panicked");
            }
        }

        Ok(())
    }
}

async fn run_subnet_loop(
    orchestrator: Arc<ScanOrchestrator>,
    subnet: SubnetSchedule,
    shutdown: CancellationToken,
) {
    let tier = subnet
        .tier
        .unwrap_or(orchestrator.config().default_tier);
    let request = ScanRequest::new(subnet.cidr.clone(), tier);
    let watchdog = Duration::from_secs(orchestrator.config().cycle_timeout_secs.max(1));

    let mut ticker = interval(Duration::from_secs(subnet.interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        tracing::info!(
            cidr = %subnet.cidr,
            name = subnet.name.as_deref().unwrap_or(""),
            tier = %tier,
            "Scheduled scan triggered"
        );

        match run_watched(&orchestrator, &request, watchdog, &shutdown).await {
            Ok(report) if report.cancelled => {
                tracing::warn!(cidr = %subnet.cidr, "Scheduled scan cancelled");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(cidr = %subnet.cidr, error = %e, "Scheduled scan failed");
            }
        }
    }

    tracing::info!(cidr = %subnet.cidr, "Subnet loop stopped");
}

/// Run one cycle under a watchdog. On overrun the cycle's token is
/// cancelled and `DiscoverError::Timeout` is returned.
pub async fn run_watched(
    orchestrator: &ScanOrchestrator,
    request: &ScanRequest,
    watchdog: Duration,
    shutdown: &CancellationToken,
) -> Result<CycleReport> {
    let cancel = shutdown.child_token();
    match timeout(watchdog, orchestrator.run_cycle(request, &cancel)).await {
        Ok(result) => result,
        Err(_) => {
            cancel.cancel();
            Err(DiscoverError::Timeout {
                secs: watchdog.as_secs(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::net::Ipv4Addr;

    use lanwarden_store::MemorySnapshotStore;

    use super::*;
    use crate::config::{DiscoverConfig, ScanTier};
    use crate::prober::Pinger;

    /// Never answers, and takes its time about it.
    struct SlowPinger;

    impl Pinger for SlowPinger {
        fn ping(&self, _target: Ipv4Addr, _seq: u16, timeout: Duration) -> io::Result<bool> {
            std::thread::sleep(timeout);
            Ok(false)
        }
    }

    struct DeadPinger;

    impl Pinger for DeadPinger {
        fn ping(&self, _target: Ipv4Addr, _seq: u16, _timeout: Duration) -> io::Result<bool> {
            Ok(false)
        }
    }

    fn orchestrator(config: DiscoverConfig, pinger: Arc<dyn Pinger>) -> Arc<ScanOrchestrator> {
        Arc::new(
            ScanOrchestrator::new(config, Arc::new(MemorySnapshotStore::new()))
                .unwrap()
                .with_pinger(pinger)
                .with_arp_table(None),
        )
    }

    #[tokio::test]
    async fn watchdog_cancels_overrunning_cycle() {
        let config = DiscoverConfig {
            liveness_timeout_ms: 200,
            host_concurrency: 1,
            ..Default::default()
        };
        let orch = orchestrator(config, Arc::new(SlowPinger));
        let request = ScanRequest::new("192.0.2.0/24", ScanTier::Quick);

        let result = run_watched(
            &orch,
            &request,
            Duration::from_millis(300),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(DiscoverError::Timeout { .. })));
        assert!(orch.inventory().is_none());
    }

    #[tokio::test]
    async fn no_enabled_subnets_is_a_config_error() {
        let config = DiscoverConfig {
            subnets: vec![SubnetSchedule {
                cidr: "10.0.0.0/24".to_string(),
                name: None,
                tier: None,
                interval_secs: 60,
                enabled: false,
            }],
            ..Default::default()
        };
        let scheduler = ScanScheduler::new(orchestrator(config, Arc::new(DeadPinger)));
        assert!(matches!(scheduler.run().await, Err(DiscoverError::Config(_))));
    }

    #[tokio::test]
    async fn shutdown_stops_subnet_loops() {
        let config = DiscoverConfig {
            subnets: vec![SubnetSchedule {
                cidr: "192.0.2.0/30".to_string(),
                name: Some("lab".to_string()),
                tier: Some(ScanTier::Quick),
                interval_secs: 3600,
                enabled: true,
            }],
            liveness_timeout_ms: 10,
            ..Default::default()
        };
        let orch = orchestrator(config, Arc::new(DeadPinger));
        let scheduler = ScanScheduler::new(orch.clone());
        let shutdown = scheduler.shutdown_token();

        let run = tokio::spawn(async move { scheduler.run().await });
        // The first tick fires immediately; wait for that cycle to commit.
        for _ in 0..100 {
            if orch.inventory().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(orch.inventory().is_some());

        shutdown.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("scheduler did not stop")
            .unwrap();
        assert!(result.is_ok());
    }
}
