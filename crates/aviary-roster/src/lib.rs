//! Roster reconciliation against the external account-linking service.
//!
//! A roster entry mirrors a confirmed friend relationship on the external
//! system: it is persisted only after the collaborator confirms an add, and
//! deleted when the collaborator confirms a removal or reports the
//! relationship absent.

pub mod duration;
pub mod http_linker;
pub mod linker;
pub mod reconciler;

pub use duration::{parse_duration_token, InvalidDurationToken};
pub use http_linker::HttpAccountLinker;
pub use linker::{AccountLinker, LinkReply, LinkStatus, LinkerError, PlayerIdentity};
pub use reconciler::{
    BulkFailure, BulkReport, RosterAddOutcome, RosterReconciler, RosterRemoveOutcome,
};
