//! Verification workflow
//!
//! State machine for marketer verification submissions and the notification
//! seam it reports committed transitions through.

pub mod machine;
pub mod notify;

pub use machine::VerificationStateMachine;
pub use notify::{
    ChannelNotifier, NoopNotifier, NotifyError, StatusChanged, StatusNotifier, TracingNotifier,
};
