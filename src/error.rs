//! Error taxonomy for the verification core
//!
//! Every failure a caller can branch on is a distinct variant. Hierarchy and
//! state-machine errors are surfaced unchanged; nothing here is
//! auto-corrected on the way out.

use thiserror::Error;
use uuid::Uuid;

use fieldforce_types::{AssignmentKind, FormKind, ParseEnumError, Role, VerificationStatus};

use crate::reconcile::Drift;

/// Which link of a reviewer chain is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingLink {
    /// The marketer has no active admin.
    Admin,
    /// The marketer's admin has no active super admin.
    SuperAdmin { admin_id: Uuid },
}

/// Errors raised by the hierarchy resolver, form tracker, state machine and
/// reconciler.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("cannot assign {subordinate_role} {subordinate_id} to {superior_role} {superior_id} as {kind}")]
    InvalidHierarchy {
        subordinate_id: Uuid,
        subordinate_role: Role,
        superior_id: Uuid,
        superior_role: Role,
        kind: AssignmentKind,
    },

    #[error("assigning {subordinate_id} under {superior_id} would create a cycle")]
    CycleDetected { subordinate_id: Uuid, superior_id: Uuid },

    #[error("{subordinate_id} already has an active {kind} assignment to {superior_id}")]
    AlreadyAssigned {
        subordinate_id: Uuid,
        superior_id: Uuid,
        kind: AssignmentKind,
    },

    #[error("reviewer chain for marketer {marketer_id} is incomplete: missing {missing:?}")]
    IncompleteHierarchy {
        marketer_id: Uuid,
        missing: MissingLink,
    },

    #[error("user {id} is a {actual}, expected {expected}")]
    WrongRole { id: Uuid, expected: Role, actual: Role },

    #[error("marketer {marketer_id} has not completed: {}", format_forms(.missing))]
    FormsIncomplete {
        marketer_id: Uuid,
        missing: Vec<FormKind>,
    },

    #[error("cannot {operation} submission {submission_id} while it is {current}")]
    WrongState {
        submission_id: Uuid,
        current: VerificationStatus,
        operation: &'static str,
    },

    #[error("actor {actor_id} may not perform this action: {reason}")]
    WrongActor { actor_id: Uuid, reason: String },

    #[error("status drift detected: {0}")]
    DriftDetected(Drift),

    #[error("{entity} {id} was modified concurrently; reload and retry")]
    Conflict { entity: &'static str, id: Uuid },

    #[error("store error: {0}")]
    Store(StoreError),
}

impl VerificationError {
    /// Stable discriminator for callers that branch or render by code.
    pub fn code(&self) -> &'static str {
        match self {
            VerificationError::NotFound { .. } => "not_found",
            VerificationError::InvalidHierarchy { .. } => "invalid_hierarchy",
            VerificationError::CycleDetected { .. } => "cycle_detected",
            VerificationError::AlreadyAssigned { .. } => "already_assigned",
            VerificationError::IncompleteHierarchy { .. } => "incomplete_hierarchy",
            VerificationError::WrongRole { .. } => "wrong_role",
            VerificationError::FormsIncomplete { .. } => "forms_incomplete",
            VerificationError::WrongState { .. } => "wrong_state",
            VerificationError::WrongActor { .. } => "wrong_actor",
            VerificationError::DriftDetected(_) => "drift_detected",
            VerificationError::Conflict { .. } => "conflict",
            VerificationError::Store(_) => "store",
        }
    }

    pub(crate) fn wrong_actor(actor_id: Uuid, reason: impl Into<String>) -> Self {
        VerificationError::WrongActor {
            actor_id,
            reason: reason.into(),
        }
    }
}

impl From<StoreError> for VerificationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { entity, id } => VerificationError::Conflict { entity, id },
            StoreError::NotFound { entity, id } => VerificationError::NotFound { entity, id },
            other => VerificationError::Store(other),
        }
    }
}

fn format_forms(forms: &[FormKind]) -> String {
    forms
        .iter()
        .map(FormKind::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised by `VerificationStore` implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A guarded write lost a race (version moved, edge deactivated, or a
    /// single-active row already exists).
    #[error("{entity} {id} changed underneath this write")]
    Conflict { entity: &'static str, id: Uuid },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("corrupt persisted value: {0}")]
    Decode(#[from] ParseEnumError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T, E = VerificationError> = std::result::Result<T, E>;
