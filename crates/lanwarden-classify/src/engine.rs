//! Classification engine: runs an ordered rule list over one host.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use chrono::{DateTime, Duration, Utc};
use lanwarden_core::services::{ServiceCategory, ServiceKnowledgeBase};
use lanwarden_core::types::{
    service_key, Finding, FindingCategory, FindingId, HostRecord, PortRecord, Severity,
};

use crate::rules;
use crate::scoring;

/// Default window in which an unacknowledged host counts as new.
pub const DEFAULT_ROGUE_WINDOW_HOURS: i64 = 24;

/// Per-pass inputs that are not part of the host itself.
///
/// `now` is stamped on every finding, so classifying the same host twice
/// with the same context gives identical output.
#[derive(Debug, Clone)]
pub struct ClassifyContext {
    pub now: DateTime<Utc>,
    /// `address:port` keys of AI endpoints the operator has approved.
    pub authorized_ai: BTreeSet<String>,
    pub rogue_window: Duration,
}

impl ClassifyContext {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            authorized_ai: BTreeSet::new(),
            rogue_window: Duration::hours(DEFAULT_ROGUE_WINDOW_HOURS),
        }
    }

    pub fn with_authorized_ai<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authorized_ai.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn with_rogue_window(mut self, window: Duration) -> Self {
        self.rogue_window = window;
        self
    }

    pub fn is_authorized(&self, address: Ipv4Addr, port: u16) -> bool {
        self.authorized_ai.contains(&service_key(address, port))
    }
}

/// A finding before it is bound to a rule, host, and timestamp.
#[derive(Debug, Clone)]
pub struct Draft {
    pub severity: Severity,
    pub category: FindingCategory,
    pub port: Option<u16>,
    pub title: String,
    pub description: String,
    pub remediation: String,
    pub detail: String,
}

impl Draft {
    pub fn new(severity: Severity, category: FindingCategory, title: impl Into<String>) -> Self {
        Self {
            severity,
            category,
            port: None,
            title: title.into(),
            description: String::new(),
            remediation: String::new(),
            detail: String::new(),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }

    pub fn remediation(mut self, text: impl Into<String>) -> Self {
        self.remediation = text.into();
        self
    }

    pub fn detail(mut self, text: impl Into<String>) -> Self {
        self.detail = text.into();
        self
    }
}

/// What a rule sees while evaluating a host.
pub struct RuleEnv<'a> {
    pub ctx: &'a ClassifyContext,
    pub kb: &'a ServiceKnowledgeBase,
}

impl RuleEnv<'_> {
    /// Category of an open port, from the knowledge base or the scanner label.
    pub fn category(&self, port: &PortRecord) -> Option<ServiceCategory> {
        self.kb.category(port.port, Some(port.label.as_str()))
    }

    /// Human-readable service name for a port.
    pub fn service_name(&self, port: &PortRecord) -> String {
        self.kb
            .lookup(port.port, Some(port.label.as_str()))
            .map(|info| info.name.into_owned())
            .unwrap_or_else(|| format!("port {}", port.port))
    }
}

/// One independent detection rule.
///
/// A rule pushes at most one finding per host, or one per matching port.
/// Rules that need data the host lacks (banner, MAC) push nothing.
pub trait Rule: Send + Sync {
    fn id(&self) -> &'static str;

    fn evaluate(&self, host: &HostRecord, env: &RuleEnv<'_>) -> Vec<Draft>;
}

pub struct ClassificationEngine {
    rules: Vec<Box<dyn Rule>>,
    kb: ServiceKnowledgeBase,
}

impl Default for ClassificationEngine {
    fn default() -> Self {
        Self::new(ServiceKnowledgeBase::standard())
    }
}

impl ClassificationEngine {
    /// Engine with the standard rule set.
    pub fn new(kb: ServiceKnowledgeBase) -> Self {
        Self {
            rules: rules::standard_rules(),
            kb,
        }
    }

    /// Engine with a caller-chosen rule list.
    pub fn with_rules(kb: ServiceKnowledgeBase, rules: Vec<Box<dyn Rule>>) -> Self {
        Self { rules, kb }
    }

    pub fn rule_ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|r| r.id())
    }

    pub fn knowledge_base(&self) -> &ServiceKnowledgeBase {
        &self.kb
    }

    /// Classify one host. Overlapping rules all fire.
    ///
    /// Output is sorted by severity (worst first), then port with host-level
    /// findings first, then rule id.
    pub fn classify(&self, host: &HostRecord, ctx: &ClassifyContext) -> Vec<Finding> {
        let env = RuleEnv { ctx, kb: &self.kb };

        let mut findings: Vec<Finding> = self
            .rules
            .iter()
            .flat_map(|rule| {
                rule.evaluate(host, &env)
                    .into_iter()
                    .map(move |draft| bind(rule.id(), host, draft, ctx.now))
            })
            .collect();

        findings.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.port.cmp(&b.port))
                .then_with(|| a.rule_id.cmp(&b.rule_id))
        });

        if !findings.is_empty() {
            tracing::debug!(
                host = %host.address,
                findings = findings.len(),
                worst = %findings[0].severity,
                "Host classified"
            );
        }

        findings
    }

    /// Classify every host, concatenating the findings in host order.
    pub fn classify_all<'h, I>(&self, hosts: I, ctx: &ClassifyContext) -> Vec<Finding>
    where
        I: IntoIterator<Item = &'h HostRecord>,
    {
        hosts
            .into_iter()
            .flat_map(|host| self.classify(host, ctx))
            .collect()
    }
}

fn bind(rule_id: &str, host: &HostRecord, draft: Draft, now: DateTime<Utc>) -> Finding {
    Finding {
        id: FindingId::derive(rule_id, host.address, draft.port),
        rule_id: rule_id.to_string(),
        risk_score: scoring::finding_risk_score(draft.severity),
        severity: draft.severity,
        category: draft.category,
        title: draft.title,
        description: draft.description,
        address: host.address,
        port: draft.port,
        remediation: draft.remediation,
        detail: draft.detail,
        detected_at: now,
    }
}
