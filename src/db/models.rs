//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::compose::ComposeAction;

/// What a job does to a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobAction {
    Start,
    Stop,
}

impl JobAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobAction::Start => "start",
            JobAction::Stop => "stop",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(JobAction::Start),
            "stop" => Some(JobAction::Stop),
            _ => None,
        }
    }

    pub fn compose_action(&self) -> ComposeAction {
        match self {
            JobAction::Start => ComposeAction::Up,
            JobAction::Stop => ComposeAction::Down,
        }
    }
}

/// Lifecycle state: pending -> running -> done | failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "done" => Some(JobStatus::Done),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Done)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

/// One start/stop invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: String,
    pub action: JobAction,
    pub name: Option<String>,
    pub status: JobStatus,
    /// Combined command output, set once the job is terminal.
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: String, action: JobAction, name: Option<String>) -> Self {
        Self {
            id,
            action,
            name,
            status: JobStatus::Pending,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Move to `running`. Returns false if the job was not pending.
    pub fn start(&mut self, at: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(JobStatus::Running) {
            return false;
        }
        self.status = JobStatus::Running;
        self.started_at = Some(at);
        true
    }

    /// Move to `done` or `failed`. Returns false if the job was not running.
    pub fn finish(&mut self, success: bool, output: String, at: DateTime<Utc>) -> bool {
        let next = if success { JobStatus::Done } else { JobStatus::Failed };
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.result = Some(output);
        self.finished_at = Some(at);
        true
    }
}
