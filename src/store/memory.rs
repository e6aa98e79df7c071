//! In-memory store
//!
//! All tables sit behind one `tokio::sync::Mutex`, so each trait method is a
//! serialized unit of work. Used by tests and by callers embedding the core
//! without Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use fieldforce_types::{
    Assignment, AssignmentKind, FormKind, FormRecord, Role, User, VerificationSubmission,
    WorkflowLogEntry,
};

use super::VerificationStore;
use crate::error::StoreError;

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    assignments: Vec<Assignment>,
    forms: Vec<FormRecord>,
    submissions: Vec<VerificationSubmission>,
    log: Vec<WorkflowLogEntry>,
}

impl Tables {
    fn active_edge_mut(
        &mut self,
        subordinate_id: Uuid,
        kind: AssignmentKind,
    ) -> Option<&mut Assignment> {
        self.assignments
            .iter_mut()
            .find(|a| a.active && a.subordinate_id == subordinate_id && a.kind == kind)
    }

    fn current_index(&self, marketer_id: Uuid) -> Option<usize> {
        self.submissions
            .iter()
            .rposition(|s| s.marketer_id == marketer_id && s.archived_at.is_none())
    }

    fn submission_index(&self, submission_id: Uuid) -> Option<usize> {
        self.submissions
            .iter()
            .position(|s| s.submission_id == submission_id)
    }

    fn check_chain_active(&self, chain_edges: &[Uuid]) -> Result<(), StoreError> {
        for edge_id in chain_edges {
            let active = self
                .assignments
                .iter()
                .any(|a| a.assignment_id == *edge_id && a.active);
            if !active {
                return Err(StoreError::Conflict {
                    entity: "assignment",
                    id: *edge_id,
                });
            }
        }
        Ok(())
    }

    fn check_version(&self, index: usize, expected: i64) -> Result<(), StoreError> {
        let stored = &self.submissions[index];
        if stored.version != expected {
            return Err(StoreError::Conflict {
                entity: "submission",
                id: stored.submission_id,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user, standing in for the identity collaborator.
    pub async fn insert_user(&self, user: User) {
        self.tables.lock().await.users.insert(user.id, user);
    }

    /// Write a submission row verbatim, bypassing every guard.
    ///
    /// Mirrors legacy code paths and data imports that set `status` directly;
    /// the reconciler exists to detect what this produces.
    pub async fn put_submission_unchecked(&self, submission: VerificationSubmission) {
        let mut tables = self.tables.lock().await;
        match tables.submission_index(submission.submission_id) {
            Some(index) => tables.submissions[index] = submission,
            None => tables.submissions.push(submission),
        }
    }

    pub async fn log_len(&self) -> usize {
        self.tables.lock().await.log.len()
    }
}

#[async_trait]
impl VerificationStore for MemoryStore {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn users_by_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        let tables = self.tables.lock().await;
        let mut users: Vec<User> = tables
            .users
            .values()
            .filter(|u| u.role == role)
            .cloned()
            .collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    async fn active_assignment(
        &self,
        subordinate_id: Uuid,
        kind: AssignmentKind,
    ) -> Result<Option<Assignment>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .assignments
            .iter()
            .find(|a| a.active && a.subordinate_id == subordinate_id && a.kind == kind)
            .cloned())
    }

    async fn active_subordinates(
        &self,
        superior_id: Uuid,
        kind: AssignmentKind,
    ) -> Result<Vec<Assignment>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .assignments
            .iter()
            .filter(|a| a.active && a.superior_id == superior_id && a.kind == kind)
            .cloned()
            .collect())
    }

    async fn assignment_history(
        &self,
        subordinate_id: Uuid,
        kind: AssignmentKind,
    ) -> Result<Vec<Assignment>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .assignments
            .iter()
            .filter(|a| a.subordinate_id == subordinate_id && a.kind == kind)
            .cloned()
            .collect())
    }

    async fn replace_assignment(
        &self,
        edge: &Assignment,
        supersedes: Option<Uuid>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let at = edge.assigned_at;

        match (tables.active_edge_mut(edge.subordinate_id, edge.kind), supersedes) {
            (None, None) => {}
            (Some(current), Some(expected)) if current.assignment_id == expected => {
                current.deactivate(edge.assigned_by, at);
            }
            (Some(current), _) => {
                return Err(StoreError::Conflict {
                    entity: "assignment",
                    id: current.assignment_id,
                })
            }
            (None, Some(expected)) => {
                return Err(StoreError::Conflict {
                    entity: "assignment",
                    id: expected,
                })
            }
        }

        tables.assignments.push(edge.clone());
        Ok(())
    }

    async fn deactivate_assignment(
        &self,
        assignment_id: Uuid,
        by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        let edge = tables
            .assignments
            .iter_mut()
            .find(|a| a.assignment_id == assignment_id)
            .ok_or(StoreError::NotFound {
                entity: "assignment",
                id: assignment_id,
            })?;

        if !edge.active {
            return Ok(false);
        }
        edge.deactivate(by, at);
        Ok(true)
    }

    async fn insert_form_record(&self, record: &FormRecord) -> Result<(), StoreError> {
        self.tables.lock().await.forms.push(record.clone());
        Ok(())
    }

    async fn form_records(
        &self,
        marketer_id: Uuid,
        kind: Option<FormKind>,
    ) -> Result<Vec<FormRecord>, StoreError> {
        let tables = self.tables.lock().await;
        let mut records: Vec<FormRecord> = tables
            .forms
            .iter()
            .filter(|r| r.marketer_id == marketer_id && kind.map_or(true, |k| r.kind == k))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.recorded_at);
        Ok(records)
    }

    async fn get_submission(
        &self,
        submission_id: Uuid,
    ) -> Result<Option<VerificationSubmission>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .submission_index(submission_id)
            .map(|i| tables.submissions[i].clone()))
    }

    async fn current_submission(
        &self,
        marketer_id: Uuid,
    ) -> Result<Option<VerificationSubmission>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .current_index(marketer_id)
            .map(|i| tables.submissions[i].clone()))
    }

    async fn submissions_for_marketer(
        &self,
        marketer_id: Uuid,
    ) -> Result<Vec<VerificationSubmission>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .submissions
            .iter()
            .filter(|s| s.marketer_id == marketer_id)
            .cloned()
            .collect())
    }

    async fn marketers_with_current_submission(&self) -> Result<Vec<Uuid>, StoreError> {
        let tables = self.tables.lock().await;
        let mut ids: Vec<Uuid> = tables
            .submissions
            .iter()
            .filter(|s| s.archived_at.is_none())
            .map(|s| s.marketer_id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn insert_submission(
        &self,
        submission: &VerificationSubmission,
        chain_edges: &[Uuid],
        entry: &WorkflowLogEntry,
    ) -> Result<VerificationSubmission, StoreError> {
        let mut tables = self.tables.lock().await;

        if let Some(index) = tables.current_index(submission.marketer_id) {
            return Err(StoreError::Conflict {
                entity: "submission",
                id: tables.submissions[index].submission_id,
            });
        }
        tables.check_chain_active(chain_edges)?;

        tables.submissions.push(submission.clone());
        tables.log.push(entry.clone());
        Ok(submission.clone())
    }

    async fn update_submission(
        &self,
        submission: &VerificationSubmission,
        entry: &WorkflowLogEntry,
    ) -> Result<VerificationSubmission, StoreError> {
        let mut tables = self.tables.lock().await;
        let index = tables
            .submission_index(submission.submission_id)
            .ok_or(StoreError::NotFound {
                entity: "submission",
                id: submission.submission_id,
            })?;
        tables.check_version(index, submission.version)?;

        let mut stored = submission.clone();
        stored.version += 1;
        tables.submissions[index] = stored.clone();
        tables.log.push(entry.clone());
        Ok(stored)
    }

    async fn archive_and_insert(
        &self,
        archived: &VerificationSubmission,
        opened: &VerificationSubmission,
        chain_edges: &[Uuid],
        entry: &WorkflowLogEntry,
    ) -> Result<VerificationSubmission, StoreError> {
        let mut tables = self.tables.lock().await;
        let index = tables
            .submission_index(archived.submission_id)
            .ok_or(StoreError::NotFound {
                entity: "submission",
                id: archived.submission_id,
            })?;
        tables.check_version(index, archived.version)?;
        tables.check_chain_active(chain_edges)?;

        // The row being archived must be the marketer's current one.
        if tables.current_index(opened.marketer_id) != Some(index) {
            return Err(StoreError::Conflict {
                entity: "submission",
                id: archived.submission_id,
            });
        }

        let mut closed = archived.clone();
        closed.version += 1;
        tables.submissions[index] = closed;
        tables.submissions.push(opened.clone());
        tables.log.push(entry.clone());
        Ok(opened.clone())
    }

    async fn log_entries(&self, submission_id: Uuid) -> Result<Vec<WorkflowLogEntry>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .log
            .iter()
            .filter(|e| e.submission_id == submission_id)
            .cloned()
            .collect())
    }

    async fn log_entries_for_marketer(
        &self,
        marketer_id: Uuid,
    ) -> Result<Vec<WorkflowLogEntry>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .log
            .iter()
            .filter(|e| e.marketer_id == marketer_id)
            .cloned()
            .collect())
    }
}
