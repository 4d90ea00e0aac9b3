//! lanwarden-core: shared models and lookup tables for the Lanwarden scanner.
//!
//! This crate provides the foundational types used across all Lanwarden crates:
//! - Host, port, finding, fingerprint, and change-event models
//! - The precedence-ordered service knowledge base
//! - Scan events handed to notification sinks
//! - Common error types

pub mod error;
pub mod events;
pub mod services;
pub mod types;

pub use error::CoreError;
pub use services::{ServiceCategory, ServiceInfo, ServiceKnowledgeBase};
pub use types::{
    ChangeEvent, ChangeKind, Finding, FindingCategory, FindingId, HostRecord, PortRecord,
    PortState, ScanId, ServiceFingerprint, Severity, Transport,
};
