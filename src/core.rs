//! Verification Core facade
//!
//! Wires the resolver, tracker, state machine and reconciler over one shared
//! store and notifier, and answers the questions the surrounding product asks:
//! who reviews this marketer, and may this marketer transact.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use fieldforce_types::{Actor, FormKind, FormRecord, Role, VerificationSubmission};

use crate::config::CoreConfig;
use crate::error::{Result, VerificationError};
use crate::forms::FormCompletionTracker;
use crate::hierarchy::HierarchyResolver;
use crate::reconcile::StatusReconciler;
use crate::store::{MemoryStore, VerificationStore};
use crate::workflow::{
    ChannelNotifier, NoopNotifier, StatusChanged, StatusNotifier, VerificationStateMachine,
};

/// Where a reviewer pair came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ReviewerSource {
    /// Frozen onto the marketer's open submission.
    Snapshot { submission_id: Uuid },
    /// Resolved from the live hierarchy.
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reviewers {
    pub admin_id: Uuid,
    pub super_admin_id: Uuid,
    pub source: ReviewerSource,
}

/// Outcome of a form intake call.
#[derive(Debug, Clone)]
pub struct FormIntake {
    pub record: FormRecord,
    /// Set when this form completed the set and a submission was opened.
    pub opened: Option<VerificationSubmission>,
}

pub struct VerificationCore {
    store: Arc<dyn VerificationStore>,
    hierarchy: Arc<HierarchyResolver>,
    forms: FormCompletionTracker,
    machine: VerificationStateMachine,
    reconciler: StatusReconciler,
}

impl VerificationCore {
    pub fn new(
        store: Arc<dyn VerificationStore>,
        notifier: Arc<dyn StatusNotifier>,
        config: &CoreConfig,
    ) -> Self {
        let hierarchy = Arc::new(HierarchyResolver::new(
            store.clone(),
            config.max_chain_depth,
        ));
        Self {
            forms: FormCompletionTracker::new(store.clone()),
            machine: VerificationStateMachine::new(
                store.clone(),
                hierarchy.clone(),
                notifier.clone(),
                config.resubmission_policy,
            ),
            reconciler: StatusReconciler::new(store.clone(), notifier),
            hierarchy,
            store,
        }
    }

    /// In-memory core with no notifications. The store handle is returned so
    /// callers can seed users.
    pub fn in_memory(config: &CoreConfig) -> (Self, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let core = Self::new(store.clone(), Arc::new(NoopNotifier), config);
        (core, store)
    }

    /// Core whose status changes are delivered over a bounded channel sized
    /// by `config.notify_channel_capacity`.
    pub fn with_channel(
        store: Arc<dyn VerificationStore>,
        config: &CoreConfig,
    ) -> (Self, mpsc::Receiver<StatusChanged>) {
        let (notifier, rx) = ChannelNotifier::new(config.notify_channel_capacity);
        (Self::new(store, Arc::new(notifier), config), rx)
    }

    /// Postgres-backed core using `config.database_url`.
    #[cfg(feature = "database")]
    pub async fn connect(
        config: &CoreConfig,
        notifier: Arc<dyn StatusNotifier>,
    ) -> std::result::Result<Self, crate::error::StoreError> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| sqlx::Error::Configuration("DATABASE_URL is not set".into()))?;
        let pool = sqlx::PgPool::connect(url).await?;
        let store = Arc::new(crate::store::PgStore::new(pool));
        Ok(Self::new(store, notifier, config))
    }

    pub fn store(&self) -> &Arc<dyn VerificationStore> {
        &self.store
    }

    pub fn hierarchy(&self) -> &HierarchyResolver {
        &self.hierarchy
    }

    pub fn forms(&self) -> &FormCompletionTracker {
        &self.forms
    }

    pub fn machine(&self) -> &VerificationStateMachine {
        &self.machine
    }

    pub fn reconciler(&self) -> &StatusReconciler {
        &self.reconciler
    }

    /// Record a form and open a submission once the set is complete.
    ///
    /// The open is skipped while a current submission exists, and deferred
    /// (logged, not failed) while the reviewer chain is incomplete.
    pub async fn submit_form(&self, marketer_id: Uuid, kind: FormKind) -> Result<FormIntake> {
        let record = self.forms.record_submission(marketer_id, kind).await?;

        let completion = self.forms.is_complete(marketer_id).await?;
        if !completion.all() {
            debug!(
                "Marketer {} still missing {:?}",
                marketer_id,
                completion.missing()
            );
            return Ok(FormIntake {
                record,
                opened: None,
            });
        }
        if self.machine.current_submission(marketer_id).await?.is_some() {
            debug!(
                "Marketer {} already has a current submission; not opening",
                marketer_id
            );
            return Ok(FormIntake {
                record,
                opened: None,
            });
        }

        let actor = Actor::new(marketer_id, Role::Marketer);
        let opened = match self.machine.open(marketer_id, actor).await {
            Ok(submission) => Some(submission),
            Err(VerificationError::IncompleteHierarchy { missing, .. }) => {
                info!(
                    "Forms complete for {} but reviewer chain is missing {:?}; open deferred",
                    marketer_id, missing
                );
                None
            }
            // Someone else opened it first.
            Err(VerificationError::Conflict { .. } | VerificationError::WrongState { .. }) => None,
            Err(e) => return Err(e),
        };
        Ok(FormIntake { record, opened })
    }

    /// The reviewers accountable for this marketer right now.
    pub async fn current_reviewers(&self, marketer_id: Uuid) -> Result<Reviewers> {
        if let Some(open) = self
            .machine
            .current_submission(marketer_id)
            .await?
            .filter(|s| s.is_open())
        {
            return Ok(Reviewers {
                admin_id: open.admin_id,
                super_admin_id: open.super_admin_id,
                source: ReviewerSource::Snapshot {
                    submission_id: open.submission_id,
                },
            });
        }

        let chain = self.hierarchy.resolve_chain(marketer_id).await?;
        Ok(Reviewers {
            admin_id: chain.admin_id,
            super_admin_id: chain.super_admin_id,
            source: ReviewerSource::Live,
        })
    }

    /// True iff the current submission is approved and not revoked.
    pub async fn is_authorized(&self, marketer_id: Uuid) -> Result<bool> {
        Ok(self
            .machine
            .current_submission(marketer_id)
            .await?
            .map_or(false, |s| s.authorizes_activity()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldforce_types::{AssignmentKind, User};

    #[tokio::test]
    async fn test_submit_form_defers_open_without_hierarchy() {
        let (core, store) = VerificationCore::in_memory(&CoreConfig::default());
        let marketer = User::new(Role::Marketer, "Mo");
        store.insert_user(marketer.clone()).await;

        for kind in FormKind::ALL {
            let intake = core.submit_form(marketer.id, kind).await.unwrap();
            assert!(intake.opened.is_none());
        }
        assert!(core.machine().current_submission(marketer.id).await.unwrap().is_none());
        assert!(!core.is_authorized(marketer.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_current_reviewers_prefers_snapshot() {
        let (core, store) = VerificationCore::in_memory(&CoreConfig::default());
        let master = User::new(Role::MasterAdmin, "Root");
        let marketer = User::new(Role::Marketer, "Mo");
        let admin = User::new(Role::Admin, "Ada");
        let other_admin = User::new(Role::Admin, "Abe");
        let super_admin = User::new(Role::SuperAdmin, "Sam");
        for u in [&master, &marketer, &admin, &other_admin, &super_admin] {
            store.insert_user(u.clone()).await;
        }
        let h = core.hierarchy();
        h.assign(marketer.id, admin.id, AssignmentKind::MarketerToAdmin, master.actor())
            .await
            .unwrap();
        for a in [&admin, &other_admin] {
            h.assign(a.id, super_admin.id, AssignmentKind::AdminToSuperAdmin, master.actor())
                .await
                .unwrap();
        }

        let live = core.current_reviewers(marketer.id).await.unwrap();
        assert_eq!(live.source, ReviewerSource::Live);

        let mut opened = None;
        for kind in FormKind::ALL {
            opened = core.submit_form(marketer.id, kind).await.unwrap().opened;
        }
        let opened = opened.unwrap();

        h.reassign(marketer.id, other_admin.id, master.actor())
            .await
            .unwrap();
        let reviewers = core.current_reviewers(marketer.id).await.unwrap();
        assert_eq!(reviewers.admin_id, admin.id);
        assert_eq!(
            reviewers.source,
            ReviewerSource::Snapshot {
                submission_id: opened.submission_id
            }
        );
    }
}
