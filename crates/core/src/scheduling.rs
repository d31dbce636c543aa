//! Job states, priority constants and the state machine.
//!
//! This module lives in `core` (zero internal deps) so the store layer, the
//! worker loop and any external tooling agree on which transitions exist.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Priority constants
// ---------------------------------------------------------------------------

/// Priority assigned when the enqueue request does not specify one.
/// Higher values are claimed first.
pub const PRIORITY_NORMAL: i64 = 0;

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// Lifecycle state of a job, stored as lowercase text in the `jobs` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Dead,
}

impl JobState {
    /// Every state, in display order.
    pub const ALL: [JobState; 4] = [
        JobState::Pending,
        JobState::Processing,
        JobState::Completed,
        JobState::Dead,
    ];

    /// The text stored in the database for this state.
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Dead => "dead",
        }
    }

    /// `completed` and `dead` accept no transition from a worker.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Dead)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobState::Pending),
            "processing" => Ok(JobState::Processing),
            "completed" => Ok(JobState::Completed),
            "dead" => Ok(JobState::Dead),
            other => Err(CoreError::Validation(format!(
                "Unknown job state '{other}' (expected pending, processing, completed or dead)"
            ))),
        }
    }
}

impl TryFrom<String> for JobState {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

pub mod state_machine {
    use super::JobState;
    use crate::error::CoreError;

    /// Returns the set of states reachable from `from`.
    ///
    /// `dead -> pending` is the operator-driven DLQ retry; `completed` has
    /// no outgoing transitions.
    pub fn valid_transitions(from: JobState) -> &'static [JobState] {
        match from {
            JobState::Pending => &[JobState::Processing],
            JobState::Processing => &[JobState::Completed, JobState::Pending, JobState::Dead],
            JobState::Dead => &[JobState::Pending],
            JobState::Completed => &[],
        }
    }

    /// Check whether a transition from `from` to `to` is valid.
    pub fn can_transition(from: JobState, to: JobState) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Validate a transition for job `id`, returning
    /// [`CoreError::InvalidTransition`] for illegal ones.
    pub fn validate_transition(id: &str, from: JobState, to: JobState) -> Result<(), CoreError> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                id: id.to_string(),
                from,
                to,
            })
        }
    }
}
