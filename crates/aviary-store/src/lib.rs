//! Durable record collections for the Aviary control plane.
//!
//! Four JSON-backed collections (tenants, bots, players, links) with
//! whole-collection replace semantics, per-collection locking spanning each
//! load-modify-replace sequence, and recover-to-empty handling of absent or
//! corrupt data.

pub mod quota;
pub mod records;
pub mod store;

pub use quota::{admit_new_bot, QuotaDecision};
pub use records::{
    next_record_id, BotRecord, BotStatus, LinkRecord, PlayerRecord, TenantRecord,
};
pub use store::{RecordStore, StoreHealthReport};
