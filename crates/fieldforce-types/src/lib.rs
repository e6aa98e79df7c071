//! Field Force Domain Types
//!
//! Pure data structures shared by the verification core and its stores.
//! Nothing in this crate performs I/O; persisted enums carry `as_str()` and
//! `FromStr` so adapters can map them to text columns.
//!
//! ## Hierarchy
//!
//! ```text
//! MasterAdmin (single tier, no per-record assignment)
//!      │
//! SuperAdmin ◄── AdminToSuperAdmin ── Admin ◄── MarketerToAdmin ── Marketer
//! ```

pub mod assignment;
pub mod audit;
pub mod forms;
pub mod identity;
pub mod submission;

pub use assignment::*;
pub use audit::*;
pub use forms::*;
pub use identity::*;
pub use submission::*;

use thiserror::Error;

/// A persisted enum column held a value this build does not know.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
