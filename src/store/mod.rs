//! Persistence seam for the verification core.
//!
//! The resolver, tracker, state machine and reconciler operate exclusively
//! through [`VerificationStore`]. Every mutating method is one atomic unit of
//! work: either the whole write (including its audit entry) lands or none of
//! it does. Guarded writes report lost races as [`StoreError::Conflict`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use fieldforce_types::{
    Assignment, AssignmentKind, FormKind, FormRecord, Role, User, VerificationSubmission,
    WorkflowLogEntry,
};

use crate::error::StoreError;

pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "database")]
pub use postgres::PgStore;

#[async_trait]
pub trait VerificationStore: Send + Sync {
    // ── Users (read-only reference) ──

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn users_by_role(&self, role: Role) -> Result<Vec<User>, StoreError>;

    // ── Assignments ──

    async fn active_assignment(
        &self,
        subordinate_id: Uuid,
        kind: AssignmentKind,
    ) -> Result<Option<Assignment>, StoreError>;

    async fn active_subordinates(
        &self,
        superior_id: Uuid,
        kind: AssignmentKind,
    ) -> Result<Vec<Assignment>, StoreError>;

    /// Every edge ever held by `subordinate_id` of this kind, oldest first.
    async fn assignment_history(
        &self,
        subordinate_id: Uuid,
        kind: AssignmentKind,
    ) -> Result<Vec<Assignment>, StoreError>;

    /// Deactivate `supersedes` and insert `edge` in one unit of work.
    ///
    /// Conflicts when `supersedes` is no longer the subordinate's active edge,
    /// or when `supersedes` is `None` but an active edge already exists.
    async fn replace_assignment(
        &self,
        edge: &Assignment,
        supersedes: Option<Uuid>,
    ) -> Result<(), StoreError>;

    /// Returns `false` if the edge was already inactive.
    async fn deactivate_assignment(
        &self,
        assignment_id: Uuid,
        by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    // ── Form records ──

    async fn insert_form_record(&self, record: &FormRecord) -> Result<(), StoreError>;

    /// Records for a marketer, oldest first, optionally narrowed to one kind.
    async fn form_records(
        &self,
        marketer_id: Uuid,
        kind: Option<FormKind>,
    ) -> Result<Vec<FormRecord>, StoreError>;

    // ── Submissions ──

    async fn get_submission(
        &self,
        submission_id: Uuid,
    ) -> Result<Option<VerificationSubmission>, StoreError>;

    /// The marketer's latest non-archived submission.
    async fn current_submission(
        &self,
        marketer_id: Uuid,
    ) -> Result<Option<VerificationSubmission>, StoreError>;

    /// All submissions for a marketer including archived ones, oldest first.
    async fn submissions_for_marketer(
        &self,
        marketer_id: Uuid,
    ) -> Result<Vec<VerificationSubmission>, StoreError>;

    async fn marketers_with_current_submission(&self) -> Result<Vec<Uuid>, StoreError>;

    /// Insert a new current submission with its opening log entry.
    ///
    /// Conflicts when the marketer already has a current submission, or when
    /// any assignment in `chain_edges` is no longer active.
    async fn insert_submission(
        &self,
        submission: &VerificationSubmission,
        chain_edges: &[Uuid],
        entry: &WorkflowLogEntry,
    ) -> Result<VerificationSubmission, StoreError>;

    /// Persist a mutated submission plus its log entry.
    ///
    /// `submission.version` must equal the stored version; the stored copy is
    /// written with the version bumped and returned.
    async fn update_submission(
        &self,
        submission: &VerificationSubmission,
        entry: &WorkflowLogEntry,
    ) -> Result<VerificationSubmission, StoreError>;

    /// Archive `archived` (version-checked) and insert `opened` together.
    async fn archive_and_insert(
        &self,
        archived: &VerificationSubmission,
        opened: &VerificationSubmission,
        chain_edges: &[Uuid],
        entry: &WorkflowLogEntry,
    ) -> Result<VerificationSubmission, StoreError>;

    // ── Workflow log (append-only) ──

    async fn log_entries(&self, submission_id: Uuid) -> Result<Vec<WorkflowLogEntry>, StoreError>;

    async fn log_entries_for_marketer(
        &self,
        marketer_id: Uuid,
    ) -> Result<Vec<WorkflowLogEntry>, StoreError>;
}
