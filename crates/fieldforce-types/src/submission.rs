//! Verification submission record and its status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{FormKind, ParseEnumError, Role};

/// Approval pipeline status.
///
/// `NoSubmission` is never stored. `PendingMarketerForms` is derived from
/// missing forms; it is only ever written by drift correction, which parks a
/// submission whose forms have gone missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    NoSubmission,
    PendingMarketerForms,
    PendingAdminReview,
    PendingSuperAdminReview,
    PendingMasterAdminApproval,
    Approved,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::NoSubmission => "no_submission",
            VerificationStatus::PendingMarketerForms => "pending_marketer_forms",
            VerificationStatus::PendingAdminReview => "pending_admin_review",
            VerificationStatus::PendingSuperAdminReview => "pending_super_admin_review",
            VerificationStatus::PendingMasterAdminApproval => "pending_master_admin_approval",
            VerificationStatus::Approved => "approved",
            VerificationStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VerificationStatus::Approved | VerificationStatus::Rejected
        )
    }

    /// Non-terminal statuses a stored submission can hold.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            VerificationStatus::PendingMarketerForms
                | VerificationStatus::PendingAdminReview
                | VerificationStatus::PendingSuperAdminReview
                | VerificationStatus::PendingMasterAdminApproval
        )
    }

    /// Position along the approval path. `Rejected` has no rank: it is
    /// reachable from every pending stage.
    pub fn stage_rank(&self) -> Option<u8> {
        match self {
            VerificationStatus::NoSubmission => Some(0),
            VerificationStatus::PendingMarketerForms => Some(1),
            VerificationStatus::PendingAdminReview => Some(2),
            VerificationStatus::PendingSuperAdminReview => Some(3),
            VerificationStatus::PendingMasterAdminApproval => Some(4),
            VerificationStatus::Approved => Some(5),
            VerificationStatus::Rejected => None,
        }
    }

    /// True when moving from `self` to `target` would undo approval progress.
    pub fn is_behind(&self, target: VerificationStatus) -> bool {
        match (self.stage_rank(), target.stage_rank()) {
            (Some(from), Some(to)) => to < from,
            (None, Some(_)) => true,
            (_, None) => false,
        }
    }

    /// The reviewer tier that holds this stage, if any.
    pub fn stage_holder(&self) -> Option<Role> {
        match self {
            VerificationStatus::PendingAdminReview => Some(Role::Admin),
            VerificationStatus::PendingSuperAdminReview => Some(Role::SuperAdmin),
            VerificationStatus::PendingMasterAdminApproval => Some(Role::MasterAdmin),
            VerificationStatus::NoSubmission
            | VerificationStatus::PendingMarketerForms
            | VerificationStatus::Approved
            | VerificationStatus::Rejected => None,
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no_submission" => Ok(VerificationStatus::NoSubmission),
            "pending_marketer_forms" => Ok(VerificationStatus::PendingMarketerForms),
            "pending_admin_review" => Ok(VerificationStatus::PendingAdminReview),
            "pending_super_admin_review" => Ok(VerificationStatus::PendingSuperAdminReview),
            "pending_master_admin_approval" => Ok(VerificationStatus::PendingMasterAdminApproval),
            "approved" => Ok(VerificationStatus::Approved),
            "rejected" => Ok(VerificationStatus::Rejected),
            other => Err(ParseEnumError::new("verification_status", other)),
        }
    }
}

/// Why a reviewer rejected, and which forms the rejection calls into question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionReason {
    pub text: String,
    #[serde(default)]
    pub implicated_forms: Vec<FormKind>,
}

impl RejectionReason {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            implicated_forms: Vec::new(),
        }
    }

    pub fn implicating(mut self, kind: FormKind) -> Self {
        if !self.implicated_forms.contains(&kind) {
            self.implicated_forms.push(kind);
        }
        self
    }
}

/// One verification attempt for one marketer.
///
/// `admin_id` and `super_admin_id` are the reviewer chain captured when the
/// submission was opened. They are never re-resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSubmission {
    pub submission_id: Uuid,
    pub marketer_id: Uuid,
    pub admin_id: Uuid,
    pub super_admin_id: Uuid,
    pub status: VerificationStatus,

    pub admin_reviewed_at: Option<DateTime<Utc>>,
    pub admin_notes: Option<String>,
    pub superadmin_reviewed_at: Option<DateTime<Utc>>,
    pub superadmin_notes: Option<String>,
    pub masteradmin_approved_at: Option<DateTime<Utc>>,

    pub rejection_reason: Option<String>,
    pub rejected_by_role: Option<Role>,
    pub rejected_at: Option<DateTime<Utc>>,
    /// Forms that must be recorded again after `rejected_at` before reopening.
    #[serde(default)]
    pub resubmit_forms: Vec<FormKind>,

    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<Uuid>,
    pub revocation_reason: Option<String>,

    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency counter, bumped by the store on every write.
    pub version: i64,
}

impl VerificationSubmission {
    /// A freshly opened submission, waiting on its admin.
    pub fn open(marketer_id: Uuid, admin_id: Uuid, super_admin_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            submission_id: Uuid::new_v4(),
            marketer_id,
            admin_id,
            super_admin_id,
            status: VerificationStatus::PendingAdminReview,
            admin_reviewed_at: None,
            admin_notes: None,
            superadmin_reviewed_at: None,
            superadmin_notes: None,
            masteradmin_approved_at: None,
            rejection_reason: None,
            rejected_by_role: None,
            rejected_at: None,
            resubmit_forms: Vec::new(),
            revoked_at: None,
            revoked_by: None,
            revocation_reason: None,
            archived_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Approved and not withdrawn: the marketer may transact.
    pub fn authorizes_activity(&self) -> bool {
        self.status == VerificationStatus::Approved && !self.is_revoked()
    }

    /// Closed in a way that permits `reopen`.
    pub fn is_reopenable(&self) -> bool {
        match self.status {
            VerificationStatus::Rejected => true,
            VerificationStatus::Approved => self.is_revoked(),
            _ => false,
        }
    }
}
