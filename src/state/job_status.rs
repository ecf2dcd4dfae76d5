/// Job status definitions for the crawl state machine
///
/// A job moves `Pending -> InProgress -> {Completed, Failed}` and never
/// leaves a terminal state.
use crate::TrawlError;
use std::fmt;

/// Represents the lifecycle state of a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    /// Job was created but its workers have not started yet
    Pending,

    /// Frontier is seeded and workers are running
    InProgress,

    // ===== Terminal States =====
    /// Frontier exhausted with no in-flight work (cap reached or not)
    Completed,

    /// The seed URL could not be crawled
    Failed,
}

impl JobStatus {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Failed)
        )
    }

    /// Validates a move to `next` and returns the new status
    ///
    /// # Returns
    ///
    /// * `Ok(JobStatus)` - `next`, when the move is legal
    /// * `Err(TrawlError::InvalidTransition)` - otherwise
    pub fn transition(self, next: JobStatus) -> Result<JobStatus, TrawlError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TrawlError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "IN_PROGRESS" => Some(Self::InProgress),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all job statuses
    pub fn all_states() -> [Self; 4] {
        [Self::Pending, Self::InProgress, Self::Completed, Self::Failed]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
