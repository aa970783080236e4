use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::OrderOutcome;
use crate::errors::Result;

/// Tally of a finished batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchReport {
    pub accepted: usize,
    pub rejected: usize,
    /// Local or transport errors, and panicked tasks.
    pub failed: usize,
    /// Candidates dropped before dispatch (zero amount).
    pub skipped: usize,
}

impl BatchReport {
    pub fn dispatched(&self) -> usize {
        self.accepted + self.rejected + self.failed
    }
}

/// Lifecycle calls dispatched together. Each runs as its own task with no
/// ordering between them. Dropping the batch detaches the calls: they still
/// run to completion and update the tracker, only the report is lost.
#[must_use = "join the batch to learn how its calls ended"]
pub struct Batch {
    label: &'static str,
    tasks: JoinSet<Result<OrderOutcome>>,
    skipped: usize,
}

impl Batch {
    pub(crate) fn new(label: &'static str) -> Self {
        Self {
            label,
            tasks: JoinSet::new(),
            skipped: 0,
        }
    }

    pub(crate) fn tasks_mut(&mut self) -> &mut JoinSet<Result<OrderOutcome>> {
        &mut self.tasks
    }

    pub(crate) fn skip(&mut self) {
        self.skipped += 1;
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every call in the batch.
    pub async fn join(mut self) -> BatchReport {
        let mut report = BatchReport {
            skipped: self.skipped,
            ..BatchReport::default()
        };
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(Ok(OrderOutcome::Accepted)) => report.accepted += 1,
                Ok(Ok(OrderOutcome::Rejected(_))) => report.rejected += 1,
                Ok(Err(e)) => {
                    warn!(error = %e, batch = self.label, "[OMS] order call failed");
                    report.failed += 1;
                }
                Err(e) => {
                    error!(error = %e, batch = self.label, "[OMS] order task aborted");
                    report.failed += 1;
                }
            }
        }
        info!(
            batch = self.label,
            accepted = report.accepted,
            rejected = report.rejected,
            failed = report.failed,
            skipped = report.skipped,
            "[OMS] batch complete"
        );
        report
    }
}

impl Drop for Batch {
    fn drop(&mut self) {
        self.tasks.detach_all();
    }
}
