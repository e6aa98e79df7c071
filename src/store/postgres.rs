//! Postgres Store
//!
//! `VerificationStore` over the `fieldforce` schema. Each mutating method
//! runs in one transaction: touched rows are locked with `FOR UPDATE`,
//! submissions are version-checked, and the partial unique indexes back the
//! single-active-edge and single-current-submission invariants.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use fieldforce_types::{
    Assignment, AssignmentKind, FormKind, FormRecord, Role, User, VerificationStatus,
    VerificationSubmission, WorkflowLogEntry,
};

use super::VerificationStore;
use crate::error::StoreError;

const UNIQUE_VIOLATION: &str = "23505";

const SUBMISSION_SELECT: &str = r#"
    SELECT submission_id, marketer_id, admin_id, super_admin_id, status,
           admin_reviewed_at, admin_notes, superadmin_reviewed_at, superadmin_notes,
           masteradmin_approved_at, rejection_reason, rejected_by_role, rejected_at,
           resubmit_forms, revoked_at, revoked_by, revocation_reason,
           archived_at, created_at, updated_at, version
    FROM fieldforce.verification_submissions
"#;

const ASSIGNMENT_SELECT: &str = r#"
    SELECT assignment_id, subordinate_id, superior_id, kind, active,
           assigned_by, assigned_at, deactivated_at, deactivated_by
    FROM fieldforce.assignments
"#;

const LOG_SELECT: &str = r#"
    SELECT entry_id, submission_id, marketer_id, actor_id, actor_role, action,
           previous_status, new_status, note, created_at
    FROM fieldforce.workflow_log
"#;

/// Postgres-backed store
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(include_str!("../../migrations/0001_verification_core.sql"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Upsert a user row on behalf of the identity service.
    pub async fn upsert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO fieldforce.users (user_id, role, name, location)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE SET
                name = EXCLUDED.name,
                location = EXCLUDED.location
            "#,
        )
        .bind(user.id)
        .bind(user.role.as_str())
        .bind(&user.name)
        .bind(&user.location)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl VerificationStore for PgStore {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, role, name, location
            FROM fieldforce.users
            WHERE user_id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn users_by_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, role, name, location
            FROM fieldforce.users
            WHERE role = $1
            ORDER BY user_id
            "#,
        )
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn active_assignment(
        &self,
        subordinate_id: Uuid,
        kind: AssignmentKind,
    ) -> Result<Option<Assignment>, StoreError> {
        let sql = format!(
            "{} WHERE subordinate_id = $1 AND kind = $2 AND active",
            ASSIGNMENT_SELECT
        );
        let row = sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(subordinate_id)
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Assignment::try_from).transpose()
    }

    async fn active_subordinates(
        &self,
        superior_id: Uuid,
        kind: AssignmentKind,
    ) -> Result<Vec<Assignment>, StoreError> {
        let sql = format!(
            "{} WHERE superior_id = $1 AND kind = $2 AND active ORDER BY assigned_at",
            ASSIGNMENT_SELECT
        );
        let rows = sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(superior_id)
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Assignment::try_from).collect()
    }

    async fn assignment_history(
        &self,
        subordinate_id: Uuid,
        kind: AssignmentKind,
    ) -> Result<Vec<Assignment>, StoreError> {
        let sql = format!(
            "{} WHERE subordinate_id = $1 AND kind = $2 ORDER BY assigned_at",
            ASSIGNMENT_SELECT
        );
        let rows = sqlx::query_as::<_, AssignmentRow>(&sql)
            .bind(subordinate_id)
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Assignment::try_from).collect()
    }

    async fn replace_assignment(
        &self,
        edge: &Assignment,
        supersedes: Option<Uuid>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT assignment_id FROM fieldforce.assignments
            WHERE subordinate_id = $1 AND kind = $2 AND active
            FOR UPDATE
            "#,
        )
        .bind(edge.subordinate_id)
        .bind(edge.kind.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        match (current, supersedes) {
            (None, None) => {}
            (Some(current), Some(expected)) if current == expected => {
                sqlx::query(
                    r#"
                    UPDATE fieldforce.assignments
                    SET active = FALSE, deactivated_at = $2, deactivated_by = $3
                    WHERE assignment_id = $1
                    "#,
                )
                .bind(current)
                .bind(edge.assigned_at)
                .bind(edge.assigned_by)
                .execute(&mut *tx)
                .await?;
            }
            (Some(current), _) => {
                return Err(StoreError::Conflict {
                    entity: "assignment",
                    id: current,
                })
            }
            (None, Some(expected)) => {
                return Err(StoreError::Conflict {
                    entity: "assignment",
                    id: expected,
                })
            }
        }

        sqlx::query(
            r#"
            INSERT INTO fieldforce.assignments
            (assignment_id, subordinate_id, superior_id, kind, active,
             assigned_by, assigned_at, deactivated_at, deactivated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(edge.assignment_id)
        .bind(edge.subordinate_id)
        .bind(edge.superior_id)
        .bind(edge.kind.as_str())
        .bind(edge.active)
        .bind(edge.assigned_by)
        .bind(edge.assigned_at)
        .bind(edge.deactivated_at)
        .bind(edge.deactivated_by)
        .execute(&mut *tx)
        .await
        .map_err(conflict_on_unique("assignment", edge.subordinate_id))?;

        tx.commit().await?;
        Ok(())
    }

    async fn deactivate_assignment(
        &self,
        assignment_id: Uuid,
        by: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let active = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT active FROM fieldforce.assignments
            WHERE assignment_id = $1
            FOR UPDATE
            "#,
        )
        .bind(assignment_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "assignment",
            id: assignment_id,
        })?;

        if !active {
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE fieldforce.assignments
            SET active = FALSE, deactivated_at = $2, deactivated_by = $3
            WHERE assignment_id = $1
            "#,
        )
        .bind(assignment_id)
        .bind(at)
        .bind(by)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn insert_form_record(&self, record: &FormRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO fieldforce.form_records (form_id, marketer_id, kind, recorded_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(record.form_id)
        .bind(record.marketer_id)
        .bind(record.kind.as_str())
        .bind(record.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn form_records(
        &self,
        marketer_id: Uuid,
        kind: Option<FormKind>,
    ) -> Result<Vec<FormRecord>, StoreError> {
        let rows = sqlx::query_as::<_, FormRecordRow>(
            r#"
            SELECT form_id, marketer_id, kind, recorded_at
            FROM fieldforce.form_records
            WHERE marketer_id = $1 AND ($2::text IS NULL OR kind = $2)
            ORDER BY recorded_at
            "#,
        )
        .bind(marketer_id)
        .bind(kind.map(|k| k.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(FormRecord::try_from).collect()
    }

    async fn get_submission(
        &self,
        submission_id: Uuid,
    ) -> Result<Option<VerificationSubmission>, StoreError> {
        let sql = format!("{} WHERE submission_id = $1", SUBMISSION_SELECT);
        let row = sqlx::query_as::<_, SubmissionRow>(&sql)
            .bind(submission_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(VerificationSubmission::try_from).transpose()
    }

    async fn current_submission(
        &self,
        marketer_id: Uuid,
    ) -> Result<Option<VerificationSubmission>, StoreError> {
        let sql = format!(
            "{} WHERE marketer_id = $1 AND archived_at IS NULL",
            SUBMISSION_SELECT
        );
        let row = sqlx::query_as::<_, SubmissionRow>(&sql)
            .bind(marketer_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(VerificationSubmission::try_from).transpose()
    }

    async fn submissions_for_marketer(
        &self,
        marketer_id: Uuid,
    ) -> Result<Vec<VerificationSubmission>, StoreError> {
        let sql = format!(
            "{} WHERE marketer_id = $1 ORDER BY created_at",
            SUBMISSION_SELECT
        );
        let rows = sqlx::query_as::<_, SubmissionRow>(&sql)
            .bind(marketer_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(VerificationSubmission::try_from).collect()
    }

    async fn marketers_with_current_submission(&self) -> Result<Vec<Uuid>, StoreError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT marketer_id FROM fieldforce.verification_submissions
            WHERE archived_at IS NULL
            ORDER BY marketer_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn insert_submission(
        &self,
        submission: &VerificationSubmission,
        chain_edges: &[Uuid],
        entry: &WorkflowLogEntry,
    ) -> Result<VerificationSubmission, StoreError> {
        let mut tx = self.pool.begin().await?;

        check_chain_active(&mut tx, chain_edges).await?;
        insert_submission_row(&mut tx, submission)
            .await
            .map_err(conflict_on_unique("submission", submission.marketer_id))?;
        insert_log_entry(&mut tx, entry).await?;

        tx.commit().await?;
        Ok(submission.clone())
    }

    async fn update_submission(
        &self,
        submission: &VerificationSubmission,
        entry: &WorkflowLogEntry,
    ) -> Result<VerificationSubmission, StoreError> {
        let mut tx = self.pool.begin().await?;

        lock_version(&mut tx, submission).await?;
        let mut stored = submission.clone();
        stored.version += 1;
        update_submission_row(&mut tx, &stored).await?;
        insert_log_entry(&mut tx, entry).await?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn archive_and_insert(
        &self,
        archived: &VerificationSubmission,
        opened: &VerificationSubmission,
        chain_edges: &[Uuid],
        entry: &WorkflowLogEntry,
    ) -> Result<VerificationSubmission, StoreError> {
        let mut tx = self.pool.begin().await?;

        lock_version(&mut tx, archived).await?;
        ensure_current(&mut tx, archived, opened.marketer_id).await?;
        check_chain_active(&mut tx, chain_edges).await?;

        let mut closed = archived.clone();
        closed.version += 1;
        update_submission_row(&mut tx, &closed).await?;
        insert_submission_row(&mut tx, opened)
            .await
            .map_err(conflict_on_unique("submission", opened.marketer_id))?;
        insert_log_entry(&mut tx, entry).await?;

        tx.commit().await?;
        Ok(opened.clone())
    }

    async fn log_entries(&self, submission_id: Uuid) -> Result<Vec<WorkflowLogEntry>, StoreError> {
        let sql = format!(
            "{} WHERE submission_id = $1 ORDER BY created_at, entry_id",
            LOG_SELECT
        );
        let rows = sqlx::query_as::<_, LogRow>(&sql)
            .bind(submission_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(WorkflowLogEntry::try_from).collect()
    }

    async fn log_entries_for_marketer(
        &self,
        marketer_id: Uuid,
    ) -> Result<Vec<WorkflowLogEntry>, StoreError> {
        let sql = format!(
            "{} WHERE marketer_id = $1 ORDER BY created_at, entry_id",
            LOG_SELECT
        );
        let rows = sqlx::query_as::<_, LogRow>(&sql)
            .bind(marketer_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(WorkflowLogEntry::try_from).collect()
    }
}

// ── transaction helpers ──

/// Share-lock the snapshot edges; any that are gone or inactive is a lost race.
async fn check_chain_active(conn: &mut PgConnection, edges: &[Uuid]) -> Result<(), StoreError> {
    let live = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT assignment_id FROM fieldforce.assignments
        WHERE assignment_id = ANY($1) AND active
        FOR SHARE
        "#,
    )
    .bind(edges.to_vec())
    .fetch_all(&mut *conn)
    .await?;

    match edges.iter().find(|id| !live.contains(id)) {
        Some(id) => Err(StoreError::Conflict {
            entity: "assignment",
            id: *id,
        }),
        None => Ok(()),
    }
}

/// Lock the stored row and compare versions.
async fn lock_version(
    conn: &mut PgConnection,
    submission: &VerificationSubmission,
) -> Result<(), StoreError> {
    let stored = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT version FROM fieldforce.verification_submissions
        WHERE submission_id = $1
        FOR UPDATE
        "#,
    )
    .bind(submission.submission_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(StoreError::NotFound {
        entity: "submission",
        id: submission.submission_id,
    })?;

    if stored != submission.version {
        return Err(StoreError::Conflict {
            entity: "submission",
            id: submission.submission_id,
        });
    }
    Ok(())
}

/// The row being archived must still be the marketer's current one.
async fn ensure_current(
    conn: &mut PgConnection,
    archived: &VerificationSubmission,
    marketer_id: Uuid,
) -> Result<(), StoreError> {
    let current = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT submission_id FROM fieldforce.verification_submissions
        WHERE submission_id = $1 AND marketer_id = $2 AND archived_at IS NULL
        FOR UPDATE
        "#,
    )
    .bind(archived.submission_id)
    .bind(marketer_id)
    .fetch_optional(&mut *conn)
    .await?;

    if current.is_none() {
        return Err(StoreError::Conflict {
            entity: "submission",
            id: archived.submission_id,
        });
    }
    Ok(())
}

async fn insert_submission_row(
    conn: &mut PgConnection,
    s: &VerificationSubmission,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO fieldforce.verification_submissions
        (submission_id, marketer_id, admin_id, super_admin_id, status,
         admin_reviewed_at, admin_notes, superadmin_reviewed_at, superadmin_notes,
         masteradmin_approved_at, rejection_reason, rejected_by_role, rejected_at,
         resubmit_forms, revoked_at, revoked_by, revocation_reason,
         archived_at, created_at, updated_at, version)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                $14, $15, $16, $17, $18, $19, $20, $21)
        "#,
    )
    .bind(s.submission_id)
    .bind(s.marketer_id)
    .bind(s.admin_id)
    .bind(s.super_admin_id)
    .bind(s.status.as_str())
    .bind(s.admin_reviewed_at)
    .bind(&s.admin_notes)
    .bind(s.superadmin_reviewed_at)
    .bind(&s.superadmin_notes)
    .bind(s.masteradmin_approved_at)
    .bind(&s.rejection_reason)
    .bind(s.rejected_by_role.map(|r| r.as_str()))
    .bind(s.rejected_at)
    .bind(sqlx::types::Json(&s.resubmit_forms))
    .bind(s.revoked_at)
    .bind(s.revoked_by)
    .bind(&s.revocation_reason)
    .bind(s.archived_at)
    .bind(s.created_at)
    .bind(s.updated_at)
    .bind(s.version)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn update_submission_row(
    conn: &mut PgConnection,
    s: &VerificationSubmission,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE fieldforce.verification_submissions SET
            status = $2,
            admin_reviewed_at = $3,
            admin_notes = $4,
            superadmin_reviewed_at = $5,
            superadmin_notes = $6,
            masteradmin_approved_at = $7,
            rejection_reason = $8,
            rejected_by_role = $9,
            rejected_at = $10,
            resubmit_forms = $11,
            revoked_at = $12,
            revoked_by = $13,
            revocation_reason = $14,
            archived_at = $15,
            updated_at = $16,
            version = $17
        WHERE submission_id = $1
        "#,
    )
    .bind(s.submission_id)
    .bind(s.status.as_str())
    .bind(s.admin_reviewed_at)
    .bind(&s.admin_notes)
    .bind(s.superadmin_reviewed_at)
    .bind(&s.superadmin_notes)
    .bind(s.masteradmin_approved_at)
    .bind(&s.rejection_reason)
    .bind(s.rejected_by_role.map(|r| r.as_str()))
    .bind(s.rejected_at)
    .bind(sqlx::types::Json(&s.resubmit_forms))
    .bind(s.revoked_at)
    .bind(s.revoked_by)
    .bind(&s.revocation_reason)
    .bind(s.archived_at)
    .bind(s.updated_at)
    .bind(s.version)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_log_entry(conn: &mut PgConnection, e: &WorkflowLogEntry) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO fieldforce.workflow_log
        (entry_id, submission_id, marketer_id, actor_id, actor_role, action,
         previous_status, new_status, note, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(e.entry_id)
    .bind(e.submission_id)
    .bind(e.marketer_id)
    .bind(e.actor_id)
    .bind(e.actor_role.map(|r| r.as_str()))
    .bind(e.action.as_str())
    .bind(e.previous_status.map(|s| s.as_str()))
    .bind(e.new_status.as_str())
    .bind(&e.note)
    .bind(e.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Unique-index violations are the database's way of reporting a lost race.
fn conflict_on_unique(entity: &'static str, id: Uuid) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StoreError::Conflict { entity, id }
        }
        _ => StoreError::Database(e),
    }
}

// ── rows ──

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    user_id: Uuid,
    role: String,
    name: String,
    location: Option<String>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.user_id,
            role: row.role.parse()?,
            name: row.name,
            location: row.location,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AssignmentRow {
    assignment_id: Uuid,
    subordinate_id: Uuid,
    superior_id: Uuid,
    kind: String,
    active: bool,
    assigned_by: Uuid,
    assigned_at: DateTime<Utc>,
    deactivated_at: Option<DateTime<Utc>>,
    deactivated_by: Option<Uuid>,
}

impl TryFrom<AssignmentRow> for Assignment {
    type Error = StoreError;

    fn try_from(row: AssignmentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            assignment_id: row.assignment_id,
            subordinate_id: row.subordinate_id,
            superior_id: row.superior_id,
            kind: row.kind.parse()?,
            active: row.active,
            assigned_by: row.assigned_by,
            assigned_at: row.assigned_at,
            deactivated_at: row.deactivated_at,
            deactivated_by: row.deactivated_by,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FormRecordRow {
    form_id: Uuid,
    marketer_id: Uuid,
    kind: String,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<FormRecordRow> for FormRecord {
    type Error = StoreError;

    fn try_from(row: FormRecordRow) -> Result<Self, Self::Error> {
        Ok(Self {
            form_id: row.form_id,
            marketer_id: row.marketer_id,
            kind: row.kind.parse()?,
            recorded_at: row.recorded_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubmissionRow {
    submission_id: Uuid,
    marketer_id: Uuid,
    admin_id: Uuid,
    super_admin_id: Uuid,
    status: String,
    admin_reviewed_at: Option<DateTime<Utc>>,
    admin_notes: Option<String>,
    superadmin_reviewed_at: Option<DateTime<Utc>>,
    superadmin_notes: Option<String>,
    masteradmin_approved_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    rejected_by_role: Option<String>,
    rejected_at: Option<DateTime<Utc>>,
    resubmit_forms: serde_json::Value,
    revoked_at: Option<DateTime<Utc>>,
    revoked_by: Option<Uuid>,
    revocation_reason: Option<String>,
    archived_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<SubmissionRow> for VerificationSubmission {
    type Error = StoreError;

    fn try_from(row: SubmissionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            submission_id: row.submission_id,
            marketer_id: row.marketer_id,
            admin_id: row.admin_id,
            super_admin_id: row.super_admin_id,
            status: row.status.parse()?,
            admin_reviewed_at: row.admin_reviewed_at,
            admin_notes: row.admin_notes,
            superadmin_reviewed_at: row.superadmin_reviewed_at,
            superadmin_notes: row.superadmin_notes,
            masteradmin_approved_at: row.masteradmin_approved_at,
            rejection_reason: row.rejection_reason,
            rejected_by_role: row
                .rejected_by_role
                .map(|r| r.parse::<Role>())
                .transpose()?,
            rejected_at: row.rejected_at,
            resubmit_forms: serde_json::from_value(row.resubmit_forms)?,
            revoked_at: row.revoked_at,
            revoked_by: row.revoked_by,
            revocation_reason: row.revocation_reason,
            archived_at: row.archived_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LogRow {
    entry_id: Uuid,
    submission_id: Uuid,
    marketer_id: Uuid,
    actor_id: Option<Uuid>,
    actor_role: Option<String>,
    action: String,
    previous_status: Option<String>,
    new_status: String,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<LogRow> for WorkflowLogEntry {
    type Error = StoreError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        Ok(Self {
            entry_id: row.entry_id,
            submission_id: row.submission_id,
            marketer_id: row.marketer_id,
            actor_id: row.actor_id,
            actor_role: row.actor_role.map(|r| r.parse::<Role>()).transpose()?,
            action: row.action.parse()?,
            previous_status: row
                .previous_status
                .map(|s| s.parse::<VerificationStatus>())
                .transpose()?,
            new_status: row.new_status.parse()?,
            note: row.note,
            created_at: row.created_at,
        })
    }
}
