//! Verification State Machine
//!
//! Drives one submission through admin review, super admin review and master
//! admin approval. Every transition is actor-checked against the reviewer
//! chain captured at open time, written together with exactly one log entry,
//! and announced to the notifier only after the write commits.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use fieldforce_types::{
    Actor, RejectionReason, Role, VerificationStatus, VerificationSubmission, WorkflowAction,
    WorkflowLogEntry,
};

use crate::config::ResubmissionPolicy;
use crate::error::{Result, VerificationError};
use crate::forms::completion_from;
use crate::hierarchy::{expect_role, HierarchyResolver};
use crate::store::VerificationStore;

use super::notify::{dispatch, StatusChanged, StatusNotifier};

/// The verification workflow engine
pub struct VerificationStateMachine {
    store: Arc<dyn VerificationStore>,
    hierarchy: Arc<HierarchyResolver>,
    notifier: Arc<dyn StatusNotifier>,
    policy: ResubmissionPolicy,
}

impl VerificationStateMachine {
    pub fn new(
        store: Arc<dyn VerificationStore>,
        hierarchy: Arc<HierarchyResolver>,
        notifier: Arc<dyn StatusNotifier>,
        policy: ResubmissionPolicy,
    ) -> Self {
        Self {
            store,
            hierarchy,
            notifier,
            policy,
        }
    }

    pub fn policy(&self) -> ResubmissionPolicy {
        self.policy
    }

    /// Open a submission for a marketer whose forms are complete.
    ///
    /// The reviewer chain is resolved now and frozen onto the submission.
    pub async fn open(&self, marketer_id: Uuid, actor: Actor) -> Result<VerificationSubmission> {
        let marketer = self.marketer(marketer_id).await?;
        if actor.id != marketer.id && !actor.role.is_reviewer() {
            return Err(VerificationError::wrong_actor(
                actor.id,
                "only the marketer or a reviewer may open a submission",
            ));
        }

        if let Some(current) = self.store.current_submission(marketer_id).await? {
            return Err(VerificationError::WrongState {
                submission_id: current.submission_id,
                current: current.status,
                operation: "open",
            });
        }

        self.ensure_forms_complete(marketer_id, None).await?;
        let chain = self.hierarchy.resolve_chain(marketer_id).await?;

        let submission =
            VerificationSubmission::open(marketer_id, chain.admin_id, chain.super_admin_id);
        let entry = WorkflowLogEntry::new(
            submission.submission_id,
            marketer_id,
            Some(actor),
            WorkflowAction::Opened,
            None,
            submission.status,
        );
        let stored = self
            .store
            .insert_submission(&submission, &chain.edges(), &entry)
            .await?;

        info!(
            "Opened submission {} for marketer {} (admin {}, super admin {})",
            stored.submission_id, marketer_id, stored.admin_id, stored.super_admin_id
        );
        self.announce(&stored, WorkflowAction::Opened).await;
        Ok(stored)
    }

    /// Admin sign-off: PendingAdminReview → PendingSuperAdminReview.
    pub async fn admin_review(
        &self,
        submission_id: Uuid,
        actor: Actor,
        notes: Option<String>,
    ) -> Result<VerificationSubmission> {
        let mut submission = self.get(submission_id).await?;
        if actor.id != submission.admin_id {
            return Err(VerificationError::wrong_actor(
                actor.id,
                format!("submission is assigned to admin {}", submission.admin_id),
            ));
        }
        expect_state(&submission, VerificationStatus::PendingAdminReview, "admin-review")?;

        let previous = submission.status;
        let now = Utc::now();
        submission.admin_reviewed_at = Some(now);
        submission.admin_notes = notes.clone();
        submission.status = VerificationStatus::PendingSuperAdminReview;
        submission.updated_at = now;

        self.commit(submission, previous, WorkflowAction::AdminReviewed, actor, notes)
            .await
    }

    /// Super admin sign-off: PendingSuperAdminReview → PendingMasterAdminApproval.
    pub async fn super_admin_review(
        &self,
        submission_id: Uuid,
        actor: Actor,
        notes: Option<String>,
    ) -> Result<VerificationSubmission> {
        let mut submission = self.get(submission_id).await?;
        if actor.id != submission.super_admin_id {
            return Err(VerificationError::wrong_actor(
                actor.id,
                format!(
                    "submission is assigned to super admin {}",
                    submission.super_admin_id
                ),
            ));
        }
        expect_state(
            &submission,
            VerificationStatus::PendingSuperAdminReview,
            "super-admin-review",
        )?;

        let previous = submission.status;
        let now = Utc::now();
        submission.superadmin_reviewed_at = Some(now);
        submission.superadmin_notes = notes.clone();
        submission.status = VerificationStatus::PendingMasterAdminApproval;
        submission.updated_at = now;

        self.commit(
            submission,
            previous,
            WorkflowAction::SuperAdminReviewed,
            actor,
            notes,
        )
        .await
    }

    /// Final approval by any master admin.
    pub async fn master_admin_approve(
        &self,
        submission_id: Uuid,
        actor: Actor,
    ) -> Result<VerificationSubmission> {
        let mut submission = self.get(submission_id).await?;
        require_master_admin(actor, "approve")?;
        expect_state(
            &submission,
            VerificationStatus::PendingMasterAdminApproval,
            "approve",
        )?;

        let previous = submission.status;
        let now = Utc::now();
        submission.masteradmin_approved_at = Some(now);
        submission.status = VerificationStatus::Approved;
        submission.updated_at = now;

        self.commit(
            submission,
            previous,
            WorkflowAction::MasterAdminApproved,
            actor,
            None,
        )
        .await
    }

    /// Reject from any pending stage.
    ///
    /// Allowed to the holder of the current stage, or to any master admin.
    /// The forms the marketer must resubmit are fixed here according to the
    /// configured policy.
    pub async fn reject(
        &self,
        submission_id: Uuid,
        actor: Actor,
        reason: RejectionReason,
    ) -> Result<VerificationSubmission> {
        let mut submission = self.get(submission_id).await?;
        if !submission.status.is_pending() {
            return Err(VerificationError::WrongState {
                submission_id,
                current: submission.status,
                operation: "reject",
            });
        }
        if !may_reject(&submission, actor) {
            return Err(VerificationError::wrong_actor(
                actor.id,
                format!("not the reviewer holding {}", submission.status),
            ));
        }

        let previous = submission.status;
        let now = Utc::now();
        submission.status = VerificationStatus::Rejected;
        submission.rejected_at = Some(now);
        submission.rejected_by_role = Some(actor.role);
        submission.rejection_reason = Some(reason.text.clone());
        submission.resubmit_forms = self.policy.forms_to_resubmit(&reason.implicated_forms);
        submission.updated_at = now;

        debug!(
            "Rejection of {} requires resubmitting {:?}",
            submission_id, submission.resubmit_forms
        );
        self.commit(
            submission,
            previous,
            WorkflowAction::Rejected,
            actor,
            Some(reason.text),
        )
        .await
    }

    /// Withdraw an approval. The status stays Approved; the revocation flags
    /// are what stop the marketer from transacting.
    pub async fn revoke(
        &self,
        submission_id: Uuid,
        actor: Actor,
        reason: impl Into<String>,
    ) -> Result<VerificationSubmission> {
        let mut submission = self.get(submission_id).await?;
        require_master_admin(actor, "revoke")?;
        if submission.status != VerificationStatus::Approved || submission.is_revoked() {
            return Err(VerificationError::WrongState {
                submission_id,
                current: submission.status,
                operation: "revoke",
            });
        }

        let reason = reason.into();
        let now = Utc::now();
        submission.revoked_at = Some(now);
        submission.revoked_by = Some(actor.id);
        submission.revocation_reason = Some(reason.clone());
        submission.updated_at = now;

        self.commit(
            submission,
            VerificationStatus::Approved,
            WorkflowAction::Revoked,
            actor,
            Some(reason),
        )
        .await
    }

    /// Archive a rejected or revoked submission and open a fresh one.
    ///
    /// The chain is re-resolved from the live hierarchy. With no current
    /// submission at all this behaves like `open`.
    pub async fn reopen(&self, marketer_id: Uuid, actor: Actor) -> Result<VerificationSubmission> {
        require_master_admin(actor, "reopen")?;
        self.marketer(marketer_id).await?;

        let Some(current) = self.store.current_submission(marketer_id).await? else {
            debug!("Marketer {} has no submission; reopen opens", marketer_id);
            return self.open(marketer_id, actor).await;
        };
        if !current.is_reopenable() {
            return Err(VerificationError::WrongState {
                submission_id: current.submission_id,
                current: current.status,
                operation: "reopen",
            });
        }

        self.ensure_forms_complete(marketer_id, Some(&current)).await?;
        let chain = self.hierarchy.resolve_chain(marketer_id).await?;

        let now = Utc::now();
        let mut archived = current.clone();
        archived.archived_at = Some(now);
        archived.updated_at = now;

        let opened =
            VerificationSubmission::open(marketer_id, chain.admin_id, chain.super_admin_id);
        let entry = WorkflowLogEntry::new(
            opened.submission_id,
            marketer_id,
            Some(actor),
            WorkflowAction::Reopened,
            Some(current.status),
            opened.status,
        )
        .with_note(Some(format!("supersedes {}", current.submission_id)));

        let stored = self
            .store
            .archive_and_insert(&archived, &opened, &chain.edges(), &entry)
            .await?;

        info!(
            "Reopened marketer {}: {} archived, {} opened",
            marketer_id, current.submission_id, stored.submission_id
        );
        self.announce(&stored, WorkflowAction::Reopened).await;
        Ok(stored)
    }

    pub async fn get(&self, submission_id: Uuid) -> Result<VerificationSubmission> {
        self.store
            .get_submission(submission_id)
            .await?
            .ok_or(VerificationError::NotFound {
                entity: "submission",
                id: submission_id,
            })
    }

    pub async fn current_submission(
        &self,
        marketer_id: Uuid,
    ) -> Result<Option<VerificationSubmission>> {
        Ok(self.store.current_submission(marketer_id).await?)
    }

    /// Audit trail of one submission, oldest first.
    pub async fn history(&self, submission_id: Uuid) -> Result<Vec<WorkflowLogEntry>> {
        self.get(submission_id).await?;
        Ok(self.store.log_entries(submission_id).await?)
    }

    /// Every submission a marketer has had, archived ones included.
    pub async fn submissions(&self, marketer_id: Uuid) -> Result<Vec<VerificationSubmission>> {
        Ok(self.store.submissions_for_marketer(marketer_id).await?)
    }

    // ── internals ──

    async fn marketer(&self, marketer_id: Uuid) -> Result<fieldforce_types::User> {
        let user = self
            .store
            .get_user(marketer_id)
            .await?
            .ok_or(VerificationError::NotFound {
                entity: "user",
                id: marketer_id,
            })?;
        expect_role(&user, Role::Marketer)?;
        Ok(user)
    }

    async fn ensure_forms_complete(
        &self,
        marketer_id: Uuid,
        current: Option<&VerificationSubmission>,
    ) -> Result<()> {
        let records = self.store.form_records(marketer_id, None).await?;
        let completion = completion_from(&records, current);
        if !completion.all() {
            return Err(VerificationError::FormsIncomplete {
                marketer_id,
                missing: completion.missing(),
            });
        }
        Ok(())
    }

    async fn commit(
        &self,
        submission: VerificationSubmission,
        previous: VerificationStatus,
        action: WorkflowAction,
        actor: Actor,
        note: Option<String>,
    ) -> Result<VerificationSubmission> {
        let entry = WorkflowLogEntry::new(
            submission.submission_id,
            submission.marketer_id,
            Some(actor),
            action,
            Some(previous),
            submission.status,
        )
        .with_note(note);
        let stored = self.store.update_submission(&submission, &entry).await?;

        info!(
            "Submission {}: {} → {} ({} by {} {})",
            stored.submission_id, previous, stored.status, action, actor.role, actor.id
        );
        self.announce(&stored, action).await;
        Ok(stored)
    }

    async fn announce(&self, submission: &VerificationSubmission, action: WorkflowAction) {
        let event = StatusChanged {
            marketer_id: submission.marketer_id,
            submission_id: submission.submission_id,
            new_status: submission.status,
            action,
            occurred_at: submission.updated_at,
        };
        dispatch(self.notifier.as_ref(), event).await;
    }
}

fn expect_state(
    submission: &VerificationSubmission,
    expected: VerificationStatus,
    operation: &'static str,
) -> Result<()> {
    if submission.status != expected {
        return Err(VerificationError::WrongState {
            submission_id: submission.submission_id,
            current: submission.status,
            operation,
        });
    }
    Ok(())
}

fn require_master_admin(actor: Actor, operation: &str) -> Result<()> {
    if !actor.is_master_admin() {
        return Err(VerificationError::wrong_actor(
            actor.id,
            format!("only a master admin may {}", operation),
        ));
    }
    Ok(())
}

fn may_reject(submission: &VerificationSubmission, actor: Actor) -> bool {
    if actor.is_master_admin() {
        return true;
    }
    match submission.status.stage_holder() {
        Some(Role::Admin) => actor.id == submission.admin_id,
        Some(Role::SuperAdmin) => actor.id == submission.super_admin_id,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::workflow::notify::NoopNotifier;
    use fieldforce_types::{AssignmentKind, FormKind, FormRecord, User};

    struct Desk {
        store: Arc<MemoryStore>,
        machine: VerificationStateMachine,
        master: Actor,
        marketer: User,
        admin: Actor,
        super_admin: Actor,
    }

    async fn desk(policy: ResubmissionPolicy) -> Desk {
        let store = Arc::new(MemoryStore::new());
        let master = User::new(Role::MasterAdmin, "Root");
        let marketer = User::new(Role::Marketer, "Mo");
        let admin = User::new(Role::Admin, "Ada");
        let super_admin = User::new(Role::SuperAdmin, "Sam");
        for u in [&master, &marketer, &admin, &super_admin] {
            store.insert_user(u.clone()).await;
        }

        let hierarchy = Arc::new(HierarchyResolver::new(store.clone(), 8));
        hierarchy
            .assign(marketer.id, admin.id, AssignmentKind::MarketerToAdmin, master.actor())
            .await
            .unwrap();
        hierarchy
            .assign(admin.id, super_admin.id, AssignmentKind::AdminToSuperAdmin, master.actor())
            .await
            .unwrap();
        for kind in FormKind::ALL {
            store
                .insert_form_record(&FormRecord::new(marketer.id, kind))
                .await
                .unwrap();
        }

        let machine =
            VerificationStateMachine::new(store.clone(), hierarchy, Arc::new(NoopNotifier), policy);
        Desk {
            store,
            machine,
            master: master.actor(),
            admin: admin.actor(),
            super_admin: super_admin.actor(),
            marketer,
        }
    }

    #[tokio::test]
    async fn test_open_requires_complete_forms() {
        let store = Arc::new(MemoryStore::new());
        let marketer = User::new(Role::Marketer, "Mo");
        store.insert_user(marketer.clone()).await;
        let hierarchy = Arc::new(HierarchyResolver::new(store.clone(), 8));
        let machine = VerificationStateMachine::new(
            store.clone(),
            hierarchy,
            Arc::new(NoopNotifier),
            ResubmissionPolicy::default(),
        );

        let err = machine
            .open(marketer.id, marketer.actor())
            .await
            .unwrap_err();
        match err {
            VerificationError::FormsIncomplete { missing, .. } => {
                assert_eq!(missing, FormKind::ALL.to_vec())
            }
            other => panic!("expected FormsIncomplete, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_full_approval_path_logs_every_step() {
        let d = desk(ResubmissionPolicy::AllForms).await;
        let sub = d.machine.open(d.marketer.id, d.marketer.actor()).await.unwrap();

        let sub = d
            .machine
            .admin_review(sub.submission_id, d.admin, Some("ok".into()))
            .await
            .unwrap();
        assert_eq!(sub.status, VerificationStatus::PendingSuperAdminReview);
        assert_eq!(sub.admin_notes.as_deref(), Some("ok"));

        let sub = d
            .machine
            .super_admin_review(sub.submission_id, d.super_admin, None)
            .await
            .unwrap();
        let sub = d
            .machine
            .master_admin_approve(sub.submission_id, d.master)
            .await
            .unwrap();
        assert_eq!(sub.status, VerificationStatus::Approved);
        assert!(sub.authorizes_activity());

        let actions: Vec<_> = d
            .machine
            .history(sub.submission_id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(
            actions,
            vec![
                WorkflowAction::Opened,
                WorkflowAction::AdminReviewed,
                WorkflowAction::SuperAdminReviewed,
                WorkflowAction::MasterAdminApproved,
            ]
        );
    }

    #[tokio::test]
    async fn test_stages_cannot_be_skipped() {
        let d = desk(ResubmissionPolicy::AllForms).await;
        let sub = d.machine.open(d.marketer.id, d.marketer.actor()).await.unwrap();

        let err = d
            .machine
            .master_admin_approve(sub.submission_id, d.master)
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::WrongState { .. }));

        let err = d
            .machine
            .super_admin_review(sub.submission_id, d.super_admin, None)
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::WrongState { .. }));
    }

    #[tokio::test]
    async fn test_wrong_reviewer_is_refused() {
        let d = desk(ResubmissionPolicy::AllForms).await;
        let sub = d.machine.open(d.marketer.id, d.marketer.actor()).await.unwrap();

        let stranger = Actor::new(Uuid::new_v4(), Role::Admin);
        let err = d
            .machine
            .admin_review(sub.submission_id, stranger, None)
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::WrongActor { .. }));

        // Master admins do not stand in for the admin stage.
        let err = d
            .machine
            .admin_review(sub.submission_id, d.master, None)
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::WrongActor { .. }));
    }

    #[tokio::test]
    async fn test_reject_records_resubmit_forms_per_policy() {
        let d = desk(ResubmissionPolicy::ImplicatedOnly).await;
        let sub = d.machine.open(d.marketer.id, d.marketer.actor()).await.unwrap();

        let reason = RejectionReason::new("guarantor unreachable").implicating(FormKind::GuarantorForm);
        let sub = d
            .machine
            .reject(sub.submission_id, d.admin, reason)
            .await
            .unwrap();
        assert_eq!(sub.status, VerificationStatus::Rejected);
        assert_eq!(sub.rejected_by_role, Some(Role::Admin));
        assert_eq!(sub.resubmit_forms, vec![FormKind::GuarantorForm]);

        // Terminal: nothing more happens to it.
        let err = d
            .machine
            .reject(sub.submission_id, d.master, RejectionReason::new("again"))
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::WrongState { .. }));
    }

    #[tokio::test]
    async fn test_reopen_after_rejection_requires_resubmitted_forms() {
        let d = desk(ResubmissionPolicy::ImplicatedOnly).await;
        let sub = d.machine.open(d.marketer.id, d.marketer.actor()).await.unwrap();
        let reason = RejectionReason::new("blurry").implicating(FormKind::Biodata);
        let rejected = d
            .machine
            .reject(sub.submission_id, d.master, reason)
            .await
            .unwrap();

        let err = d.machine.reopen(d.marketer.id, d.master).await.unwrap_err();
        assert!(matches!(err, VerificationError::FormsIncomplete { .. }));

        d.store
            .insert_form_record(&FormRecord::new(d.marketer.id, FormKind::Biodata))
            .await
            .unwrap();
        let fresh = d.machine.reopen(d.marketer.id, d.master).await.unwrap();
        assert_ne!(fresh.submission_id, rejected.submission_id);
        assert_eq!(fresh.status, VerificationStatus::PendingAdminReview);

        let old = d.machine.get(rejected.submission_id).await.unwrap();
        assert!(old.is_archived());
        assert_eq!(old.status, VerificationStatus::Rejected);

        let log = d.machine.history(fresh.submission_id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, WorkflowAction::Reopened);
        assert_eq!(log[0].previous_status, Some(VerificationStatus::Rejected));
    }

    #[tokio::test]
    async fn test_revoke_keeps_status_but_blocks_activity() {
        let d = desk(ResubmissionPolicy::AllForms).await;
        let sub = d.machine.open(d.marketer.id, d.marketer.actor()).await.unwrap();
        d.machine.admin_review(sub.submission_id, d.admin, None).await.unwrap();
        d.machine
            .super_admin_review(sub.submission_id, d.super_admin, None)
            .await
            .unwrap();
        d.machine
            .master_admin_approve(sub.submission_id, d.master)
            .await
            .unwrap();

        let err = d
            .machine
            .revoke(sub.submission_id, d.admin, "fraud")
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::WrongActor { .. }));

        let revoked = d
            .machine
            .revoke(sub.submission_id, d.master, "fraud")
            .await
            .unwrap();
        assert_eq!(revoked.status, VerificationStatus::Approved);
        assert!(!revoked.authorizes_activity());
        assert!(revoked.is_reopenable());

        let err = d
            .machine
            .revoke(sub.submission_id, d.master, "twice")
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::WrongState { .. }));
    }

    #[tokio::test]
    async fn test_second_open_while_pending_is_wrong_state() {
        let d = desk(ResubmissionPolicy::AllForms).await;
        d.machine.open(d.marketer.id, d.marketer.actor()).await.unwrap();
        let err = d
            .machine
            .open(d.marketer.id, d.marketer.actor())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VerificationError::WrongState {
                current: VerificationStatus::PendingAdminReview,
                ..
            }
        ));
    }
}
