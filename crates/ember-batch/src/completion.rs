//! Per-row completion accumulator returned from batch execution.

use ember_error::EmberError;

/// Outcome of one executed tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    /// The tuple executed; record counting was off.
    Success,
    /// The tuple executed, affecting this many records.
    SuccessWithCount(u64),
    /// The tuple failed. Detail, if retained, is available through
    /// [`CompletionState::error_detail`].
    Failed,
}

impl RowOutcome {
    /// Whether this row executed successfully.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        !matches!(self, Self::Failed)
    }
}

/// Ordered per-row outcome log for one `execute` call.
///
/// Rows are appended strictly in execution order. Full error detail is
/// retained for at most `detail_limit` failed rows; later failures keep
/// only the [`RowOutcome::Failed`] tag.
#[derive(Debug)]
pub struct CompletionState {
    record_counts: bool,
    detail_limit: usize,
    outcomes: Vec<RowOutcome>,
    /// `(row index, error)` pairs for the first `detail_limit` failures,
    /// in row order.
    details: Vec<(usize, EmberError)>,
}

impl CompletionState {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new(record_counts: bool, detail_limit: usize) -> Self {
        Self {
            record_counts,
            detail_limit,
            outcomes: Vec::new(),
            details: Vec::new(),
        }
    }

    /// Register a successful row, `records` being the affected-record
    /// delta observed around its send.
    pub fn register_success(&mut self, records: u64) {
        self.outcomes.push(if self.record_counts {
            RowOutcome::SuccessWithCount(records)
        } else {
            RowOutcome::Success
        });
    }

    /// Register a failed row, retaining detail while under the cap.
    pub fn register_error(&mut self, error: EmberError) {
        let row = self.outcomes.len();
        self.outcomes.push(RowOutcome::Failed);
        if self.details.len() < self.detail_limit {
            self.details.push((row, error));
        }
    }

    /// Number of rows registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether no rows were registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// All outcomes in execution order.
    #[must_use]
    pub fn outcomes(&self) -> &[RowOutcome] {
        &self.outcomes
    }

    /// Retained error detail for `row`, if that row failed under the cap.
    #[must_use]
    pub fn error_detail(&self, row: usize) -> Option<&EmberError> {
        self.details
            .iter()
            .find(|(r, _)| *r == row)
            .map(|(_, e)| e)
    }

    /// Number of rows that executed successfully.
    #[must_use]
    pub fn ok_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    /// Number of rows that failed.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.ok_count()
    }

    /// Number of failures whose detail was retained.
    #[must_use]
    pub fn detailed_count(&self) -> usize {
        self.details.len()
    }
}
