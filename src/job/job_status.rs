use serde::{Deserialize, Serialize};

/// Job status enum: lifecycle state of a job in the job store.
///
/// Serialized as lowercase strings in the store file.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Scheduled, // Waiting for next_run (only scheduled jobs are ever picked up)
    Running,   // Claimed by the daemon or executing
    Completed, // One-time job finished successfully
    Failed,    // Handler returned an error or panicked
}

impl JobStatus {
    pub fn full_name(&self) -> &'static str {
        match self {
            JobStatus::Scheduled => "scheduled",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Returns true if the job will never be picked up again without user action
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_name())
    }
}
