//! lanwarden-discover: LAN host and service discovery.
//!
//! Sweeps a subnet with ICMP echo, connect-scans live hosts, classifies
//! what it finds, and diffs each cycle against the previous snapshot kept
//! in a `SnapshotStore`. Runs one-shot or as a scheduled daemon.

pub mod config;
pub mod enumerate;
pub mod error;
pub mod icmp;
pub mod inventory;
pub mod neighbors;
pub mod notify;
pub mod orchestrator;
pub mod portscan;
pub mod ports;
pub mod prober;
pub mod progress;
pub mod scheduler;

pub use config::{DiscoverConfig, ScanTier, SubnetSchedule};
pub use error::{DiscoverError, Result};
pub use orchestrator::{CycleReport, ScanOrchestrator, ScanRequest};
