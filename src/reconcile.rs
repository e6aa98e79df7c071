//! Status Reconciler
//!
//! The stored status of a marketer's current submission must equal what the
//! facts say: form records, stage timestamps and the rejection record. The
//! reconciler derives that expected status, reports drift, and (for a master
//! admin) moves a drifted non-terminal status forward with a
//! `SystemCorrection` log entry. Terminal statuses and backward moves are
//! reported and held. It never touches hierarchy or form data.

use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use fieldforce_types::{
    Actor, FormCompletion, VerificationStatus, VerificationSubmission, WorkflowAction,
    WorkflowLogEntry,
};

use crate::error::{Result, VerificationError};
use crate::forms::completion_from;
use crate::store::VerificationStore;
use crate::workflow::notify::{dispatch, StatusChanged, StatusNotifier};

/// Stored status disagrees with the derived one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Drift {
    pub submission_id: Uuid,
    pub marketer_id: Uuid,
    pub stored: VerificationStatus,
    pub expected: VerificationStatus,
}

impl fmt::Display for Drift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "submission {} stored {} but facts say {}",
            self.submission_id, self.stored, self.expected
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Stored status already matched; nothing written.
    Consistent(VerificationSubmission),
    /// Stored status is terminal and was left alone.
    TerminalHeld {
        submission: VerificationSubmission,
        expected: VerificationStatus,
    },
    /// Facts lag the stored stage; moving back would undo review progress.
    BackwardHeld {
        submission: VerificationSubmission,
        expected: VerificationStatus,
    },
    /// Status rewritten and logged.
    Corrected {
        submission: VerificationSubmission,
        previous: VerificationStatus,
    },
}

impl ReconcileOutcome {
    pub fn submission(&self) -> &VerificationSubmission {
        match self {
            ReconcileOutcome::Consistent(submission)
            | ReconcileOutcome::TerminalHeld { submission, .. }
            | ReconcileOutcome::BackwardHeld { submission, .. }
            | ReconcileOutcome::Corrected { submission, .. } => submission,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileFailure {
    pub marketer_id: Uuid,
    pub error: String,
}

/// Result of a sweep over every marketer with a current submission.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub dry_run: bool,
    pub scanned: usize,
    pub drifted: Vec<Drift>,
    pub corrected: Vec<Uuid>,
    pub held: Vec<Drift>,
    pub failures: Vec<ReconcileFailure>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.drifted.is_empty() && self.failures.is_empty()
    }
}

/// Derive the status the facts imply.
///
/// Rejection wins; then missing forms; then the absence of a submission;
/// then the furthest stage timestamp present.
pub fn expected_status(
    submission: Option<&VerificationSubmission>,
    completion: FormCompletion,
) -> VerificationStatus {
    if submission.map_or(false, |s| s.rejected_at.is_some()) {
        return VerificationStatus::Rejected;
    }
    if !completion.all() {
        return VerificationStatus::PendingMarketerForms;
    }
    let Some(s) = submission else {
        return VerificationStatus::NoSubmission;
    };
    if s.admin_reviewed_at.is_none() {
        VerificationStatus::PendingAdminReview
    } else if s.superadmin_reviewed_at.is_none() {
        VerificationStatus::PendingSuperAdminReview
    } else if s.masteradmin_approved_at.is_none() {
        VerificationStatus::PendingMasterAdminApproval
    } else {
        VerificationStatus::Approved
    }
}

pub struct StatusReconciler {
    store: Arc<dyn VerificationStore>,
    notifier: Arc<dyn StatusNotifier>,
}

impl StatusReconciler {
    pub fn new(store: Arc<dyn VerificationStore>, notifier: Arc<dyn StatusNotifier>) -> Self {
        Self { store, notifier }
    }

    pub async fn compute_expected_status(&self, marketer_id: Uuid) -> Result<VerificationStatus> {
        let (current, expected) = self.derive(marketer_id).await?;
        debug!(
            "Expected status for {}: {} (stored {:?})",
            marketer_id,
            expected,
            current.as_ref().map(|s| s.status)
        );
        Ok(expected)
    }

    pub async fn detect_drift(&self, marketer_id: Uuid) -> Result<Option<Drift>> {
        let (current, expected) = self.derive(marketer_id).await?;
        Ok(current.and_then(|s| drift_of(&s, expected)))
    }

    /// `Err(DriftDetected)` when the stored status disagrees with the facts.
    pub async fn verify(&self, marketer_id: Uuid) -> Result<()> {
        match self.detect_drift(marketer_id).await? {
            Some(drift) => Err(VerificationError::DriftDetected(drift)),
            None => Ok(()),
        }
    }

    /// Repair drift for one marketer. Only forward or sideways (to
    /// `Rejected`) corrections are written; terminal statuses and backward
    /// moves are held.
    pub async fn reconcile(&self, marketer_id: Uuid, actor: Actor) -> Result<ReconcileOutcome> {
        if !actor.is_master_admin() {
            return Err(VerificationError::wrong_actor(
                actor.id,
                "only a master admin may reconcile",
            ));
        }

        let (current, expected) = self.derive(marketer_id).await?;
        let mut submission = current.ok_or(VerificationError::NotFound {
            entity: "current submission",
            id: marketer_id,
        })?;

        let Some(drift) = drift_of(&submission, expected) else {
            debug!("Marketer {} is consistent at {}", marketer_id, submission.status);
            return Ok(ReconcileOutcome::Consistent(submission));
        };

        if drift.stored.is_terminal() {
            warn!("Holding terminal status: {}", drift);
            return Ok(ReconcileOutcome::TerminalHeld {
                submission,
                expected,
            });
        }
        if drift.stored.is_behind(expected) {
            warn!("Holding status, correction would move backward: {}", drift);
            return Ok(ReconcileOutcome::BackwardHeld {
                submission,
                expected,
            });
        }

        let previous = submission.status;
        submission.status = expected;
        submission.updated_at = Utc::now();
        let entry = WorkflowLogEntry::new(
            submission.submission_id,
            marketer_id,
            Some(actor),
            WorkflowAction::SystemCorrection,
            Some(previous),
            expected,
        )
        .with_note(Some(format!("reconciled: {}", drift)));

        let stored = self.store.update_submission(&submission, &entry).await?;
        info!(
            "Corrected submission {}: {} → {}",
            stored.submission_id, previous, stored.status
        );

        dispatch(
            self.notifier.as_ref(),
            StatusChanged {
                marketer_id,
                submission_id: stored.submission_id,
                new_status: stored.status,
                action: WorkflowAction::SystemCorrection,
                occurred_at: stored.updated_at,
            },
        )
        .await;

        Ok(ReconcileOutcome::Corrected {
            submission: stored,
            previous,
        })
    }

    /// Sweep every marketer with a current submission.
    ///
    /// With `dry_run` nothing is written; drift is only reported. One
    /// marketer failing does not stop the sweep.
    pub async fn reconcile_all(&self, actor: Actor, dry_run: bool) -> Result<ReconcileReport> {
        if !actor.is_master_admin() {
            return Err(VerificationError::wrong_actor(
                actor.id,
                "only a master admin may reconcile",
            ));
        }

        let marketers = self.store.marketers_with_current_submission().await?;
        let mut report = ReconcileReport {
            dry_run,
            scanned: marketers.len(),
            ..Default::default()
        };

        for marketer_id in marketers {
            let drift = match self.detect_drift(marketer_id).await {
                Ok(Some(drift)) => drift,
                Ok(None) => continue,
                Err(e) => {
                    report.failures.push(ReconcileFailure {
                        marketer_id,
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            report.drifted.push(drift.clone());

            if dry_run {
                continue;
            }
            match self.reconcile(marketer_id, actor).await {
                Ok(ReconcileOutcome::Corrected { submission, .. }) => {
                    report.corrected.push(submission.submission_id)
                }
                Ok(
                    ReconcileOutcome::TerminalHeld { .. } | ReconcileOutcome::BackwardHeld { .. },
                ) => report.held.push(drift),
                Ok(ReconcileOutcome::Consistent(_)) => {}
                Err(e) => {
                    warn!("Reconcile failed for marketer {}: {}", marketer_id, e);
                    report.failures.push(ReconcileFailure {
                        marketer_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Reconcile sweep: scanned {}, drifted {}, corrected {}, held {}, failed {}",
            report.scanned,
            report.drifted.len(),
            report.corrected.len(),
            report.held.len(),
            report.failures.len()
        );
        Ok(report)
    }

    async fn derive(
        &self,
        marketer_id: Uuid,
    ) -> Result<(Option<VerificationSubmission>, VerificationStatus)> {
        let current = self.store.current_submission(marketer_id).await?;
        let records = self.store.form_records(marketer_id, None).await?;
        let completion = completion_from(&records, current.as_ref());
        let expected = expected_status(current.as_ref(), completion);
        Ok((current, expected))
    }
}

fn drift_of(submission: &VerificationSubmission, expected: VerificationStatus) -> Option<Drift> {
    (submission.status != expected).then(|| Drift {
        submission_id: submission.submission_id,
        marketer_id: submission.marketer_id,
        stored: submission.status,
        expected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::workflow::NoopNotifier;
    use fieldforce_types::{FormKind, FormRecord, Role, User};
    use proptest::prelude::*;

    fn complete() -> FormCompletion {
        FormCompletion {
            biodata: true,
            guarantor: true,
            commitment: true,
        }
    }

    #[test]
    fn test_expected_status_order() {
        let mut s = VerificationSubmission::open(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(
            expected_status(None, FormCompletion::default()),
            VerificationStatus::PendingMarketerForms
        );
        assert_eq!(expected_status(None, complete()), VerificationStatus::NoSubmission);
        assert_eq!(
            expected_status(Some(&s), complete()),
            VerificationStatus::PendingAdminReview
        );

        s.admin_reviewed_at = Some(Utc::now());
        s.superadmin_reviewed_at = Some(Utc::now());
        assert_eq!(
            expected_status(Some(&s), complete()),
            VerificationStatus::PendingMasterAdminApproval
        );

        s.masteradmin_approved_at = Some(Utc::now());
        assert_eq!(expected_status(Some(&s), complete()), VerificationStatus::Approved);
        assert_eq!(
            expected_status(Some(&s), FormCompletion::default()),
            VerificationStatus::PendingMarketerForms
        );

        s.rejected_at = Some(Utc::now());
        assert_eq!(
            expected_status(Some(&s), FormCompletion::default()),
            VerificationStatus::Rejected
        );
    }

    proptest! {
        #[test]
        fn expected_status_is_deterministic(
            admin in any::<bool>(),
            super_admin in any::<bool>(),
            master in any::<bool>(),
            rejected in any::<bool>(),
            forms in proptest::array::uniform3(any::<bool>()),
        ) {
            let mut s = VerificationSubmission::open(Uuid::nil(), Uuid::nil(), Uuid::nil());
            let now = Utc::now();
            s.admin_reviewed_at = admin.then_some(now);
            s.superadmin_reviewed_at = super_admin.then_some(now);
            s.masteradmin_approved_at = master.then_some(now);
            s.rejected_at = rejected.then_some(now);
            let completion = FormCompletion {
                biodata: forms[0],
                guarantor: forms[1],
                commitment: forms[2],
            };

            let first = expected_status(Some(&s), completion);
            prop_assert_eq!(first, expected_status(Some(&s), completion));
            prop_assert_ne!(first, VerificationStatus::NoSubmission);
            if rejected {
                prop_assert_eq!(first, VerificationStatus::Rejected);
            }
            if first == VerificationStatus::Approved {
                prop_assert!(admin && super_admin && master && completion.all());
            }
        }
    }

    struct Books {
        store: Arc<MemoryStore>,
        reconciler: StatusReconciler,
        master: Actor,
        marketer: User,
    }

    async fn books_with_forms(kinds: &[FormKind]) -> Books {
        let store = Arc::new(MemoryStore::new());
        let master = User::new(Role::MasterAdmin, "Root");
        let marketer = User::new(Role::Marketer, "Mo");
        store.insert_user(master.clone()).await;
        store.insert_user(marketer.clone()).await;
        for kind in kinds {
            store
                .insert_form_record(&FormRecord::new(marketer.id, *kind))
                .await
                .unwrap();
        }
        let reconciler = StatusReconciler::new(store.clone(), Arc::new(NoopNotifier));
        Books {
            store,
            reconciler,
            master: master.actor(),
            marketer,
        }
    }

    #[tokio::test]
    async fn test_consistent_submission_writes_nothing() {
        let b = books_with_forms(&FormKind::ALL).await;
        let sub = VerificationSubmission::open(b.marketer.id, Uuid::new_v4(), Uuid::new_v4());
        b.store.put_submission_unchecked(sub).await;

        let before = b.store.log_len().await;
        assert_eq!(
            b.reconciler.compute_expected_status(b.marketer.id).await.unwrap(),
            VerificationStatus::PendingAdminReview
        );
        assert!(b.reconciler.verify(b.marketer.id).await.is_ok());
        let outcome = b.reconciler.reconcile(b.marketer.id, b.master).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Consistent(_)));
        assert_eq!(b.store.log_len().await, before);
    }

    #[tokio::test]
    async fn test_drift_is_corrected_and_logged() {
        let b = books_with_forms(&FormKind::ALL).await;
        let mut sub = VerificationSubmission::open(b.marketer.id, Uuid::new_v4(), Uuid::new_v4());
        sub.admin_reviewed_at = Some(Utc::now());
        // Stored status lags the admin review timestamp.
        b.store.put_submission_unchecked(sub.clone()).await;

        let err = b.reconciler.verify(b.marketer.id).await.unwrap_err();
        assert_eq!(err.code(), "drift_detected");

        let outcome = b.reconciler.reconcile(b.marketer.id, b.master).await.unwrap();
        match outcome {
            ReconcileOutcome::Corrected {
                submission,
                previous,
            } => {
                assert_eq!(previous, VerificationStatus::PendingAdminReview);
                assert_eq!(submission.status, VerificationStatus::PendingSuperAdminReview);
            }
            other => panic!("expected Corrected, got {:?}", other),
        }

        let log = b.store.log_entries(sub.submission_id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert!(log[0].is_system_correction());
        assert!(b.reconciler.detect_drift(b.marketer.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_terminal_status_is_held() {
        let b = books_with_forms(&[FormKind::Biodata]).await;
        let mut sub = VerificationSubmission::open(b.marketer.id, Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();
        sub.admin_reviewed_at = Some(now);
        sub.superadmin_reviewed_at = Some(now);
        sub.masteradmin_approved_at = Some(now);
        sub.status = VerificationStatus::Approved;
        b.store.put_submission_unchecked(sub).await;

        let outcome = b.reconciler.reconcile(b.marketer.id, b.master).await.unwrap();
        match outcome {
            ReconcileOutcome::TerminalHeld {
                submission,
                expected,
            } => {
                assert_eq!(submission.status, VerificationStatus::Approved);
                assert_eq!(expected, VerificationStatus::PendingMarketerForms);
            }
            other => panic!("expected TerminalHeld, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reconcile_requires_master_admin() {
        let b = books_with_forms(&FormKind::ALL).await;
        let admin = Actor::new(Uuid::new_v4(), Role::Admin);
        let err = b.reconciler.reconcile(b.marketer.id, admin).await.unwrap_err();
        assert!(matches!(err, VerificationError::WrongActor { .. }));
    }

    #[tokio::test]
    async fn test_stage_ahead_of_timestamps_is_not_moved_back() {
        let b = books_with_forms(&FormKind::ALL).await;
        let mut sub = VerificationSubmission::open(b.marketer.id, Uuid::new_v4(), Uuid::new_v4());
        sub.status = VerificationStatus::PendingMasterAdminApproval;
        b.store.put_submission_unchecked(sub.clone()).await;

        let drift = b.reconciler.detect_drift(b.marketer.id).await.unwrap().unwrap();
        assert_eq!(drift.expected, VerificationStatus::PendingAdminReview);

        let outcome = b.reconciler.reconcile(b.marketer.id, b.master).await.unwrap();
        match outcome {
            ReconcileOutcome::BackwardHeld {
                submission,
                expected,
            } => {
                assert_eq!(submission.status, VerificationStatus::PendingMasterAdminApproval);
                assert_eq!(expected, VerificationStatus::PendingAdminReview);
            }
            other => panic!("expected BackwardHeld, got {:?}", other),
        }
        let stored = b.store.get_submission(sub.submission_id).await.unwrap().unwrap();
        assert_eq!(stored.status, VerificationStatus::PendingMasterAdminApproval);
        assert_eq!(b.store.log_len().await, 0);

        let report = b.reconciler.reconcile_all(b.master, false).await.unwrap();
        assert!(report.corrected.is_empty());
        assert_eq!(report.held.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_forms_do_not_demote_pending_submission() {
        let b = books_with_forms(&[FormKind::Biodata]).await;
        let sub = VerificationSubmission::open(b.marketer.id, Uuid::new_v4(), Uuid::new_v4());
        b.store.put_submission_unchecked(sub).await;

        let outcome = b.reconciler.reconcile(b.marketer.id, b.master).await.unwrap();
        assert!(matches!(
            outcome,
            ReconcileOutcome::BackwardHeld {
                expected: VerificationStatus::PendingMarketerForms,
                ..
            }
        ));
        assert_eq!(outcome.submission().status, VerificationStatus::PendingAdminReview);
    }

    #[tokio::test]
    async fn test_sweep_dry_run_reports_without_writing() {
        let b = books_with_forms(&FormKind::ALL).await;
        let mut sub = VerificationSubmission::open(b.marketer.id, Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();
        sub.admin_reviewed_at = Some(now);
        sub.superadmin_reviewed_at = Some(now);
        b.store.put_submission_unchecked(sub).await;

        let report = b.reconciler.reconcile_all(b.master, true).await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.drifted.len(), 1);
        assert!(report.corrected.is_empty());
        assert_eq!(b.store.log_len().await, 0);

        let report = b.reconciler.reconcile_all(b.master, false).await.unwrap();
        assert_eq!(report.corrected.len(), 1);
        assert!(b.reconciler.reconcile_all(b.master, true).await.unwrap().is_clean());
    }
}
