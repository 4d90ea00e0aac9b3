//! lanwarden-classify: rule-based threat classification.
//!
//! `ClassificationEngine` runs the standard rule set from `rules` over a
//! `HostRecord` and returns sorted, deterministic `Finding`s. `scoring`
//! rolls findings up into per-device severity and a 0–100 network score.

pub mod engine;
pub mod rules;
pub mod scoring;

pub use engine::{ClassificationEngine, ClassifyContext, Draft, Rule, RuleEnv};
pub use scoring::{RiskSummary, SeverityBuckets};
