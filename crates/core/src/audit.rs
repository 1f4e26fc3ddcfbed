//! Step logging for agent runs.
//!
//! Every attempted pipeline step produces exactly one `StepLog` with a
//! terminal status. The recorder hands out an `OpenStep` token when a step
//! begins and consumes it when the step finishes, so a step cannot be
//! finished twice and a finished log is never mutated. A begun step is
//! recorded as `started` immediately; if the run is abandoned before its
//! token is consumed, `fail_unfinished` closes the log out as failed so the
//! attempt never vanishes from the trail.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::execution::ExecutionId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Started,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "started" => Some(Self::Started),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLog {
    pub execution_id: ExecutionId,
    pub step_name: String,
    pub ordinal: u32,
    pub status: StepStatus,
    pub input: Value,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// A step that has been started but not yet finished. Consumed by exactly
/// one of `complete`, `fail`, or `skip`.
#[derive(Debug)]
pub struct OpenStep {
    step_name: String,
    ordinal: u32,
}

impl OpenStep {
    pub fn name(&self) -> &str {
        &self.step_name
    }

    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }
}

/// Accumulates the ordered audit trail for one run. Owns ordinal
/// assignment; append-only.
#[derive(Clone, Debug)]
pub struct StepRecorder {
    execution_id: ExecutionId,
    next_ordinal: u32,
    logs: Vec<StepLog>,
}

impl StepRecorder {
    pub fn new(execution_id: ExecutionId) -> Self {
        Self { execution_id, next_ordinal: 0, logs: Vec::new() }
    }

    pub fn begin(&mut self, step_name: impl Into<String>, input: Value) -> OpenStep {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        let step_name = step_name.into();
        self.logs.push(StepLog {
            execution_id: self.execution_id.clone(),
            step_name: step_name.clone(),
            ordinal,
            status: StepStatus::Started,
            input,
            output: None,
            error: None,
            metadata: BTreeMap::new(),
            started_at: Utc::now(),
            ended_at: None,
        });
        OpenStep { step_name, ordinal }
    }

    pub fn complete(&mut self, step: OpenStep, output: Value) {
        self.finish(step, StepStatus::Completed, Some(output), None, BTreeMap::new());
    }

    pub fn complete_with_metadata(
        &mut self,
        step: OpenStep,
        output: Value,
        metadata: BTreeMap<String, String>,
    ) {
        self.finish(step, StepStatus::Completed, Some(output), None, metadata);
    }

    pub fn fail(&mut self, step: OpenStep, error: impl Into<String>) {
        self.finish(step, StepStatus::Failed, None, Some(error.into()), BTreeMap::new());
    }

    pub fn skip(&mut self, step: OpenStep, reason: impl Into<String>) {
        let metadata = BTreeMap::from([("reason".to_string(), reason.into())]);
        self.finish(step, StepStatus::Skipped, None, None, metadata);
    }

    fn finish(
        &mut self,
        step: OpenStep,
        status: StepStatus,
        output: Option<Value>,
        error: Option<String>,
        metadata: BTreeMap<String, String>,
    ) {
        // Ordinals are assigned densely, so the open step's log sits at its
        // own ordinal.
        if let Some(log) = self.logs.get_mut(step.ordinal as usize) {
            log.status = status;
            log.output = output;
            log.error = error;
            log.metadata = metadata;
            log.ended_at = Some(Utc::now());
        }
    }

    /// Close out any step that was begun but never finished, marking it
    /// failed with the given error. Used when a run is abandoned mid-step,
    /// e.g. at budget expiry, so the attempt still leaves a terminal log.
    pub fn fail_unfinished(&mut self, error: impl Into<String>) {
        let error = error.into();
        let now = Utc::now();
        for log in &mut self.logs {
            if !log.status.is_terminal() {
                log.status = StepStatus::Failed;
                log.error = Some(error.clone());
                log.ended_at = Some(now);
            }
        }
    }

    pub fn execution_id(&self) -> &ExecutionId {
        &self.execution_id
    }

    pub fn trail(&self) -> &[StepLog] {
        &self.logs
    }

    pub fn into_trail(self) -> Vec<StepLog> {
        self.logs
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{StepRecorder, StepStatus};
    use crate::domain::execution::ExecutionId;

    fn recorder() -> StepRecorder {
        StepRecorder::new(ExecutionId("exec-1".to_string()))
    }

    #[test]
    fn step_status_round_trips_from_storage_encoding() {
        for status in [
            StepStatus::Started,
            StepStatus::Completed,
            StepStatus::Failed,
            StepStatus::Skipped,
        ] {
            assert_eq!(StepStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn ordinals_are_assigned_in_attempt_order() {
        let mut recorder = recorder();

        let first = recorder.begin("resolve_order_identity", json!({}));
        recorder.complete(first, json!({"found": true}));

        let second = recorder.begin("fetch_order", json!({}));
        recorder.fail(second, "store unreachable");

        let trail = recorder.into_trail();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].ordinal, 0);
        assert_eq!(trail[1].ordinal, 1);
        assert_eq!(trail[0].status, StepStatus::Completed);
        assert_eq!(trail[1].status, StepStatus::Failed);
        assert_eq!(trail[1].error.as_deref(), Some("store unreachable"));
    }

    #[test]
    fn abandoned_step_is_closed_as_failed() {
        let mut recorder = recorder();

        let open = recorder.begin("fetch_order", json!({"order_number": "12345"}));
        assert_eq!(recorder.trail().len(), 1);
        assert_eq!(recorder.trail()[0].status, StepStatus::Started);
        assert!(recorder.trail()[0].ended_at.is_none());

        // The token is lost without ever reaching a finish call.
        drop(open);
        recorder.fail_unfinished("run budget exhausted");

        let trail = recorder.trail();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].step_name, "fetch_order");
        assert_eq!(trail[0].status, StepStatus::Failed);
        assert_eq!(trail[0].error.as_deref(), Some("run budget exhausted"));
        assert!(trail[0].ended_at.is_some());
    }

    #[test]
    fn fail_unfinished_leaves_finished_steps_untouched() {
        let mut recorder = recorder();

        let done = recorder.begin("resolve_order_identity", json!({}));
        recorder.complete(done, json!({"found": true}));
        let _abandoned = recorder.begin("fetch_order", json!({}));

        recorder.fail_unfinished("run budget exhausted");

        let trail = recorder.trail();
        assert_eq!(trail[0].status, StepStatus::Completed);
        assert!(trail[0].error.is_none());
        assert_eq!(trail[1].status, StepStatus::Failed);
    }

    #[test]
    fn every_finished_step_has_a_terminal_status_and_end_timestamp() {
        let mut recorder = recorder();

        let step = recorder.begin("fetch_tracking", json!({"tracking_number": null}));
        recorder.skip(step, "no_tracking_number");

        let trail = recorder.trail();
        assert_eq!(trail.len(), 1);
        assert!(trail[0].status.is_terminal());
        assert!(trail[0].ended_at.is_some());
        assert_eq!(trail[0].metadata.get("reason").map(String::as_str), Some("no_tracking_number"));
    }
}
