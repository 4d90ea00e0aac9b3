//! Scan progress published on a `watch` channel.

use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    #[default]
    Idle,
    Discovery,
    PortScan,
    Classification,
    ChangeDetection,
    Complete,
    Cancelled,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ScanProgress {
    pub phase: ScanPhase,
    pub completed: usize,
    pub total: usize,
    /// `completed / total` for the current phase, 0.0–1.0.
    pub fraction: f64,
    /// Host currently being worked on, if any.
    pub current: Option<String>,
}

/// Writer half of the progress channel. Cloning shares the channel.
#[derive(Clone)]
pub struct ProgressReporter {
    tx: watch::Sender<ScanProgress>,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ScanProgress::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<ScanProgress> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> ScanProgress {
        self.tx.borrow().clone()
    }

    /// Start a phase with `total` units of work.
    pub fn begin(&self, phase: ScanPhase, total: usize) {
        self.tx.send_replace(ScanProgress {
            phase,
            completed: 0,
            total,
            fraction: if total == 0 { 1.0 } else { 0.0 },
            current: None,
        });
    }

    /// One more unit of the current phase is done.
    pub fn advance(&self, current: Option<String>) {
        self.tx.send_modify(|p| {
            p.completed = (p.completed + 1).min(p.total);
            p.fraction = if p.total == 0 {
                1.0
            } else {
                p.completed as f64 / p.total as f64
            };
            p.current = current;
        });
    }

    /// Terminal phase with no further work.
    pub fn finish(&self, phase: ScanPhase) {
        self.tx.send_modify(|p| {
            p.phase = phase;
            p.current = None;
            if phase == ScanPhase::Complete {
                p.completed = p.total;
                p.fraction = 1.0;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_tracks_completed() {
        let reporter = ProgressReporter::new();
        let rx = reporter.subscribe();
        reporter.begin(ScanPhase::Discovery, 4);
        reporter.advance(Some("10.0.0.1".to_string()));
        reporter.advance(None);

        let p = rx.borrow().clone();
        assert_eq!(p.phase, ScanPhase::Discovery);
        assert_eq!(p.completed, 2);
        assert!((p.fraction - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_phase_is_complete() {
        let reporter = ProgressReporter::new();
        reporter.begin(ScanPhase::PortScan, 0);
        reporter.advance(None);
        let p = reporter.snapshot();
        assert_eq!(p.completed, 0);
        assert_eq!(p.fraction, 1.0);
    }

    #[test]
    fn cancelled_keeps_partial_counts() {
        let reporter = ProgressReporter::new();
        reporter.begin(ScanPhase::Discovery, 10);
        reporter.advance(None);
        reporter.finish(ScanPhase::Cancelled);
        let p = reporter.snapshot();
        assert_eq!(p.phase, ScanPhase::Cancelled);
        assert_eq!(p.completed, 1);
    }
}
