//! # Storage contracts
//!
//! Backends implement these traits to be usable by the [`crate::ReconciliationApi`].
//!
//! * [`PaymentRequestStore`] persists payment requests and offers the atomic status transitions. Every transition is a
//!   single conditional statement, so concurrent callers (other processes, administrators, claim links) can race
//!   freely and at most one of them wins.
//! * [`FactionDirectory`] lists the factions to reconcile and the API keys to reconcile them with.
mod data_objects;
mod faction_directory;
mod payment_request_store;

pub use data_objects::InsertRequestResult;
pub use faction_directory::FactionDirectory;
pub use payment_request_store::PaymentRequestStore;
