use serde::{Deserialize, Serialize};

use crate::model::Id;

/// Lifecycle state of a remote job.
///
/// `PENDING → RUNNING → (FINISHED | FAILED | CANCEL_REQUESTED → CANCELED)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteJobState {
    Pending,
    Running,
    Finished,
    Failed,
    CancelRequested,
    Canceled,
}

impl RemoteJobState {
    /// Terminal states; a cancel-requested job is still winding down
    pub fn is_done(&self) -> bool {
        matches!(
            self,
            RemoteJobState::Finished | RemoteJobState::Failed | RemoteJobState::Canceled
        )
    }

    pub fn is_cancel_requested(&self) -> bool {
        matches!(self, RemoteJobState::CancelRequested)
    }
}

impl std::fmt::Display for RemoteJobState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            RemoteJobState::Pending => "pending",
            RemoteJobState::Running => "running",
            RemoteJobState::Finished => "finished",
            RemoteJobState::Failed => "failed",
            RemoteJobState::CancelRequested => "cancel_requested",
            RemoteJobState::Canceled => "canceled",
        };
        write!(f, "{}", s)
    }
}

/// A trackable, cancellable background execution unit.
/// Created when scheduled and mutated only through the owning scheduler's
/// funneled update path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteJob {
    pub id: Id,
    pub description: String,
    /// Requesting principal
    pub user: String,
    pub state: RemoteJobState,
    /// 0–100, monotonically non-decreasing within a run
    pub completion_level: u8,
    pub scheduled_at: String, // ISO 8601 timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    /// Optional custom command tag for client-side dispatch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Failure detail when the job ended in `failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RemoteJob {
    pub fn new(id: Id, description: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
            user: user.into(),
            state: RemoteJobState::Pending,
            completion_level: 0,
            scheduled_at: chrono::Utc::now().to_rfc3339(),
            started_at: None,
            finished_at: None,
            command: None,
            error: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }
}

/// Lifecycle events published by the job scheduler onto its broadcast channel
#[derive(Debug, Clone)]
pub enum JobEvent {
    Scheduled(RemoteJob),
    Changed(RemoteJob),
    Removed(Id),
}
