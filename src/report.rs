//! Per-record outcomes and run reports.

use std::time::Duration;

/// Where a record stands within one run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RecordState {
    #[default]
    NotStarted,
    Failed(String),
    Completed,
}

impl RecordState {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Final state of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub uuid: String,
    pub state: RecordState,
}

/// Report generated after a preservation or validation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Records that completed
    pub succeeded: usize,

    /// Records that failed
    pub failed: usize,

    /// Message of the first failure, for the caller's summary line
    pub first_error: Option<String>,

    /// Time taken for the run
    pub duration: Duration,
}

impl RunReport {
    /// Fold record outcomes into a report.
    pub fn from_outcomes<'a>(
        outcomes: impl IntoIterator<Item = &'a RecordOutcome>,
        duration: Duration,
    ) -> Self {
        let report = outcomes
            .into_iter()
            .fold(Self::default(), |report, outcome| report.absorb(outcome));
        Self { duration, ..report }
    }

    /// Count one outcome. Records that never started are not counted.
    #[must_use]
    pub fn absorb(mut self, outcome: &RecordOutcome) -> Self {
        match &outcome.state {
            RecordState::Completed => self.succeeded += 1,
            RecordState::Failed(message) => {
                self.failed += 1;
                if self.first_error.is_none() {
                    self.first_error = Some(format!("{}: {message}", outcome.uuid));
                }
            }
            RecordState::NotStarted => {}
        }
        self
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Create a summary message
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} record(s): {} succeeded, {} failed, {:.2}s",
            self.total(),
            self.succeeded,
            self.failed,
            self.duration.as_secs_f64()
        );
        if let Some(error) = &self.first_error {
            line.push_str(&format!(" (first error: {error})"));
        }
        line
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pub report: RunReport,
    pub outcomes: Vec<RecordOutcome>,
}

impl RunResult {
    pub fn new(outcomes: Vec<RecordOutcome>, duration: Duration) -> Self {
        Self {
            report: RunReport::from_outcomes(&outcomes, duration),
            outcomes,
        }
    }

    /// State of the record with `uuid`, if it took part in the run.
    pub fn state_of(&self, uuid: &str) -> Option<&RecordState> {
        self.outcomes
            .iter()
            .find(|o| o.uuid == uuid)
            .map(|o| &o.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(uuid: &str, state: RecordState) -> RecordOutcome {
        RecordOutcome {
            uuid: uuid.to_owned(),
            state,
        }
    }

    #[test]
    fn test_fold_counts_and_keeps_first_error() {
        let outcomes = vec![
            outcome("a", RecordState::Completed),
            outcome("b", RecordState::Failed("missing field".to_owned())),
            outcome("c", RecordState::Failed("checksum".to_owned())),
            outcome("d", RecordState::NotStarted),
        ];
        let result = RunResult::new(outcomes, Duration::from_millis(1500));

        assert_eq!(result.report.succeeded, 1);
        assert_eq!(result.report.failed, 2);
        assert_eq!(result.report.total(), 3);
        assert_eq!(result.report.first_error.as_deref(), Some("b: missing field"));
        assert_eq!(result.state_of("a"), Some(&RecordState::Completed));
        assert!(result.state_of("zzz").is_none());
    }

    #[test]
    fn test_summary() {
        let report = RunReport {
            succeeded: 2,
            failed: 0,
            first_error: None,
            duration: Duration::from_secs(1),
        };
        assert_eq!(report.summary(), "2 record(s): 2 succeeded, 0 failed, 1.00s");
        assert!(!report.has_failures());
    }

    #[test]
    fn test_empty_run() {
        let result = RunResult::new(Vec::new(), Duration::ZERO);
        assert_eq!(result.report.total(), 0);
        assert!(result.report.first_error.is_none());
    }
}
