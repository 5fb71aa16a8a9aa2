//! Run log events.
//!
//! The orchestrator appends one event per stage transition to the run
//! directory so a finished run can be inspected after the fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stage::{StageKind, StageStatus};

/// A single entry in a run's append-only log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub run_id: Uuid,

    /// None for run-level events
    pub stage: Option<StageKind>,
    pub event_type: EventType,

    /// One-line description; never carries connection strings
    pub message: String,

    /// Stage (or run) status once this event is applied
    pub status: StageStatus,

    /// Wall time of a finished stage
    pub duration_ms: Option<u64>,

    /// Failure chain of a failed stage or run
    pub error: Option<String>,
}

impl Event {
    /// Event stamped with the current time
    pub fn new(
        run_id: Uuid,
        stage: Option<StageKind>,
        event_type: EventType,
        message: String,
        status: StageStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            stage,
            event_type,
            message,
            status,
            duration_ms: None,
            error: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }
}

/// Run and stage transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunStarted,
    RunSucceeded,
    RunFailed,
    StageStarted,
    StageCompleted,
    StageFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_builder() {
        let run_id = Uuid::new_v4();
        let event = Event::new(
            run_id,
            Some(StageKind::Training),
            EventType::StageFailed,
            "Stage 'model_trainer' failed".to_string(),
            StageStatus::Failed,
        )
        .with_duration(1500)
        .with_error("score below expectation".to_string());

        assert_eq!(event.run_id, run_id);
        assert_eq!(event.duration_ms, Some(1500));
        assert_eq!(event.error.as_deref(), Some("score below expectation"));

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"stage_failed\""));
        assert!(json.contains("\"model_trainer\""));
    }
}
