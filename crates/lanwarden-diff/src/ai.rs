//! AI inference service drift, keyed by `address:port`.

use chrono::{DateTime, Utc};
use lanwarden_core::types::{ServiceFingerprint, Severity};

use crate::engine::{self, Comparator, DiffReport, FieldChange, SeverityPolicy};
use crate::error::Result;
use crate::snapshot::Snapshot;

pub const DETECTOR: &str = "ai-services";
pub const SCHEME: &str = "address:port";

pub fn snapshot<I>(services: I, captured_at: DateTime<Utc>) -> Snapshot<ServiceFingerprint>
where
    I: IntoIterator<Item = ServiceFingerprint>,
{
    Snapshot::from_entities(SCHEME, captured_at, services, ServiceFingerprint::key)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AiServiceDetector;

impl AiServiceDetector {
    pub fn detect(
        &self,
        previous: Option<&Snapshot<ServiceFingerprint>>,
        current: &Snapshot<ServiceFingerprint>,
    ) -> Result<DiffReport> {
        engine::diff(DETECTOR, previous, current, self, self)
    }
}

impl Comparator<ServiceFingerprint> for AiServiceDetector {
    fn compare(&self, previous: &ServiceFingerprint, current: &ServiceFingerprint) -> Vec<FieldChange> {
        let mut changes = Vec::new();
        changes.extend(FieldChange::between(
            "service_type",
            Some(&previous.service_type),
            Some(&current.service_type),
        ));
        changes.extend(FieldChange::between(
            "version",
            previous.version.as_ref(),
            current.version.as_ref(),
        ));
        changes.extend(FieldChange::between(
            "authorized",
            Some(&previous.authorized),
            Some(&current.authorized),
        ));
        changes
    }

    fn describe(&self, service: &ServiceFingerprint) -> Option<String> {
        Some(match &service.version {
            Some(version) => format!("{} {version}", service.service_type),
            None => service.service_type.clone(),
        })
    }
}

impl SeverityPolicy<ServiceFingerprint> for AiServiceDetector {
    fn appeared(&self, _key: &str, service: &ServiceFingerprint) -> Severity {
        if service.authorized {
            Severity::Low
        } else {
            Severity::High
        }
    }

    fn disappeared(&self, _key: &str, _service: &ServiceFingerprint) -> Severity {
        Severity::Info
    }

    fn changed(
        &self,
        _key: &str,
        _previous: &ServiceFingerprint,
        current: &ServiceFingerprint,
        change: &FieldChange,
    ) -> Severity {
        match change.field.as_str() {
            "authorized" if current.authorized => Severity::Info,
            "authorized" => Severity::High,
            _ => Severity::Medium,
        }
    }
}
