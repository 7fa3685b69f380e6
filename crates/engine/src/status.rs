use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Coarse grouping shared by workflow and step statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    Inactive,
    Active,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Blank,
    New,
    Paused,
    Active,
    Degraded,
    Completed,
    Cancelled,
    Aborted,
    Failed,
}

impl WorkflowStatus {
    pub const INACTIVE: &'static [WorkflowStatus] =
        &[WorkflowStatus::Blank, WorkflowStatus::New, WorkflowStatus::Paused];
    pub const ACTIVE: &'static [WorkflowStatus] = &[WorkflowStatus::Active, WorkflowStatus::Degraded];
    pub const FINISHED: &'static [WorkflowStatus] = &[
        WorkflowStatus::Completed,
        WorkflowStatus::Cancelled,
        WorkflowStatus::Aborted,
        WorkflowStatus::Failed,
    ];

    pub fn category(&self) -> StatusCategory {
        match self {
            WorkflowStatus::Blank | WorkflowStatus::New | WorkflowStatus::Paused => StatusCategory::Inactive,
            WorkflowStatus::Active | WorkflowStatus::Degraded => StatusCategory::Active,
            WorkflowStatus::Completed
            | WorkflowStatus::Cancelled
            | WorkflowStatus::Aborted
            | WorkflowStatus::Failed => StatusCategory::Finished,
        }
    }

    pub fn is_active(&self) -> bool {
        self.category() == StatusCategory::Active
    }

    pub fn is_finished(&self) -> bool {
        self.category() == StatusCategory::Finished
    }

    /// The finished status named by a state label, if any.
    pub fn terminal_for_label(label: &str) -> Option<Self> {
        label.parse::<Self>().ok().filter(|s| s.is_finished())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Blank => "BLANK",
            WorkflowStatus::New => "NEW",
            WorkflowStatus::Paused => "PAUSED",
            WorkflowStatus::Active => "ACTIVE",
            WorkflowStatus::Degraded => "DEGRADED",
            WorkflowStatus::Completed => "COMPLETED",
            WorkflowStatus::Cancelled => "CANCELLED",
            WorkflowStatus::Aborted => "ABORTED",
            WorkflowStatus::Failed => "FAILED",
        }
    }
}

impl Default for WorkflowStatus {
    fn default() -> Self {
        WorkflowStatus::New
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BLANK" => Ok(WorkflowStatus::Blank),
            "NEW" => Ok(WorkflowStatus::New),
            "PAUSED" => Ok(WorkflowStatus::Paused),
            "ACTIVE" => Ok(WorkflowStatus::Active),
            "DEGRADED" => Ok(WorkflowStatus::Degraded),
            "COMPLETED" => Ok(WorkflowStatus::Completed),
            "CANCELLED" => Ok(WorkflowStatus::Cancelled),
            "ABORTED" => Ok(WorkflowStatus::Aborted),
            "FAILED" => Ok(WorkflowStatus::Failed),
            _ => Err(Error::Execution(format!("Invalid workflow status: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Blank,
    Paused,
    Active,
    Completed,
    Cancelled,
    Ignored,
    Aborted,
    Failed,
}

impl StepStatus {
    pub const INACTIVE: &'static [StepStatus] = &[StepStatus::Blank, StepStatus::Paused];
    pub const ACTIVE: &'static [StepStatus] = &[StepStatus::Active];
    pub const FINISHED: &'static [StepStatus] = &[
        StepStatus::Completed,
        StepStatus::Cancelled,
        StepStatus::Ignored,
        StepStatus::Aborted,
        StepStatus::Failed,
    ];

    pub fn category(&self) -> StatusCategory {
        match self {
            StepStatus::Blank | StepStatus::Paused => StatusCategory::Inactive,
            StepStatus::Active => StatusCategory::Active,
            StepStatus::Completed
            | StepStatus::Cancelled
            | StepStatus::Ignored
            | StepStatus::Aborted
            | StepStatus::Failed => StatusCategory::Finished,
        }
    }

    pub fn is_active(&self) -> bool {
        self.category() == StatusCategory::Active
    }

    pub fn is_finished(&self) -> bool {
        self.category() == StatusCategory::Finished
    }

    pub fn terminal_for_label(label: &str) -> Option<Self> {
        label.parse::<Self>().ok().filter(|s| s.is_finished())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Blank => "BLANK",
            StepStatus::Paused => "PAUSED",
            StepStatus::Active => "ACTIVE",
            StepStatus::Completed => "COMPLETED",
            StepStatus::Cancelled => "CANCELLED",
            StepStatus::Ignored => "IGNORED",
            StepStatus::Aborted => "ABORTED",
            StepStatus::Failed => "FAILED",
        }
    }
}

impl Default for StepStatus {
    fn default() -> Self {
        StepStatus::Active
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BLANK" => Ok(StepStatus::Blank),
            "PAUSED" => Ok(StepStatus::Paused),
            "ACTIVE" => Ok(StepStatus::Active),
            "COMPLETED" => Ok(StepStatus::Completed),
            "CANCELLED" => Ok(StepStatus::Cancelled),
            "IGNORED" => Ok(StepStatus::Ignored),
            "ABORTED" => Ok(StepStatus::Aborted),
            "FAILED" => Ok(StepStatus::Failed),
            _ => Err(Error::Execution(format!("Invalid step status: {}", s))),
        }
    }
}
