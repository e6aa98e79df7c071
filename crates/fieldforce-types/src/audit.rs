//! Append-only workflow audit log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{Actor, ParseEnumError, Role, VerificationStatus};

/// What kind of move a log entry records.
///
/// `SystemCorrection` is kept distinct so audits can tell drift repair apart
/// from organic progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    Opened,
    AdminReviewed,
    SuperAdminReviewed,
    MasterAdminApproved,
    Rejected,
    Reopened,
    Revoked,
    SystemCorrection,
}

impl WorkflowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowAction::Opened => "opened",
            WorkflowAction::AdminReviewed => "admin_reviewed",
            WorkflowAction::SuperAdminReviewed => "super_admin_reviewed",
            WorkflowAction::MasterAdminApproved => "master_admin_approved",
            WorkflowAction::Rejected => "rejected",
            WorkflowAction::Reopened => "reopened",
            WorkflowAction::Revoked => "revoked",
            WorkflowAction::SystemCorrection => "system_correction",
        }
    }
}

impl fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowAction {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "opened" => Ok(WorkflowAction::Opened),
            "admin_reviewed" => Ok(WorkflowAction::AdminReviewed),
            "super_admin_reviewed" => Ok(WorkflowAction::SuperAdminReviewed),
            "master_admin_approved" => Ok(WorkflowAction::MasterAdminApproved),
            "rejected" => Ok(WorkflowAction::Rejected),
            "reopened" => Ok(WorkflowAction::Reopened),
            "revoked" => Ok(WorkflowAction::Revoked),
            "system_correction" => Ok(WorkflowAction::SystemCorrection),
            other => Err(ParseEnumError::new("workflow_action", other)),
        }
    }
}

/// Record of one transition. Never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowLogEntry {
    pub entry_id: Uuid,
    pub submission_id: Uuid,
    pub marketer_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub actor_role: Option<Role>,
    pub action: WorkflowAction,
    /// `None` only for the entry that opens a brand-new submission.
    pub previous_status: Option<VerificationStatus>,
    pub new_status: VerificationStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowLogEntry {
    pub fn new(
        submission_id: Uuid,
        marketer_id: Uuid,
        actor: Option<Actor>,
        action: WorkflowAction,
        previous_status: Option<VerificationStatus>,
        new_status: VerificationStatus,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            submission_id,
            marketer_id,
            actor_id: actor.map(|a| a.id),
            actor_role: actor.map(|a| a.role),
            action,
            previous_status,
            new_status,
            note: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }

    pub fn is_system_correction(&self) -> bool {
        self.action == WorkflowAction::SystemCorrection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_captures_actor() {
        let actor = Actor::new(Uuid::new_v4(), Role::Admin);
        let entry = WorkflowLogEntry::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Some(actor),
            WorkflowAction::AdminReviewed,
            Some(VerificationStatus::PendingAdminReview),
            VerificationStatus::PendingSuperAdminReview,
        )
        .with_note(Some("documents legible".to_string()));

        assert_eq!(entry.actor_id, Some(actor.id));
        assert_eq!(entry.actor_role, Some(Role::Admin));
        assert_eq!(entry.note.as_deref(), Some("documents legible"));
        assert!(!entry.is_system_correction());
    }

    #[test]
    fn test_action_serde_matches_column_text() {
        let json = serde_json::to_string(&WorkflowAction::SystemCorrection).unwrap();
        assert_eq!(json, format!("\"{}\"", WorkflowAction::SystemCorrection.as_str()));
        assert_eq!(
            "reopened".parse::<WorkflowAction>().unwrap(),
            WorkflowAction::Reopened
        );
    }
}
