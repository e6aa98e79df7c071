//! fieldforce-kyc - Marketer Verification Core
//!
//! Governs how a field marketer becomes authorised to transact: the
//! Marketer → Admin → SuperAdmin assignment hierarchy, the three KYC
//! sub-forms, the staged review of a verification submission, and the
//! reconciler that repairs status drift.
//!
//! ## Layout
//!
//! - [`hierarchy`]: assignment edges and reviewer chain resolution
//! - [`forms`]: form records and derived completion
//! - [`workflow`]: the verification state machine and status notifications
//! - [`reconcile`]: expected-status derivation and drift repair
//! - [`store`]: the persistence trait plus in-memory and Postgres stores
//! - [`core`]: [`VerificationCore`], the entry point for the host product
//!
//! Domain types live in the `fieldforce-types` crate and are re-exported here.

pub mod config;
pub mod core;
pub mod error;
pub mod forms;
pub mod hierarchy;
pub mod reconcile;
pub mod store;
pub mod workflow;

pub use fieldforce_types::*;

pub use crate::config::{ConfigError, CoreConfig, ResubmissionPolicy};
pub use crate::core::{FormIntake, ReviewerSource, Reviewers, VerificationCore};
pub use crate::error::{MissingLink, Result, StoreError, VerificationError};
pub use crate::forms::{completion_from, FormCompletionTracker};
pub use crate::hierarchy::{HierarchyResolver, Reassignment, ReviewerChain};
pub use crate::reconcile::{
    expected_status, Drift, ReconcileFailure, ReconcileOutcome, ReconcileReport, StatusReconciler,
};
pub use crate::store::{MemoryStore, VerificationStore};
pub use crate::workflow::{
    ChannelNotifier, NoopNotifier, NotifyError, StatusChanged, StatusNotifier, TracingNotifier,
    VerificationStateMachine,
};

#[cfg(feature = "database")]
pub use crate::store::PgStore;
