//! Faction Payments
//!
//! Members who front items for faction crimes are reimbursed with an in-game deposit. This library tracks those
//! reimbursements as payment requests and closes them automatically once the matching deposit shows up in the
//! faction's news feed.
//!
//! The library is divided into three main sections:
//! 1. Storage ([`mod@db`]). [`PaymentRequestStore`] defines the atomic state transitions a backend must offer, and
//!    [`FactionDirectory`] supplies the factions and their API credentials. SQLite is the supported backend. The data
//!    types stored in the database live in [`db_types`] and are public.
//! 2. Evidence. [`helpers::parse_deposit_text`] turns raw news text into [`db_types::DepositEvidence`], and
//!    [`matching`] decides which open request, if any, a deposit pays for.
//! 3. Reconciliation ([`ReconciliationApi`]). One call to [`ReconciliationApi::run`] expires stale claims and then
//!    walks every faction, fulfilling requests and notifying the faction through a [`PaymentNotifier`].
mod db;

pub mod db_types;
pub mod helpers;
pub mod matching;
pub mod notifier;
mod reconciliation;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use db::sqlite::{self, SqliteDatabase, SqliteDatabaseError};
pub use db::traits::{FactionDirectory, InsertRequestResult, PaymentRequestStore};
pub use notifier::{LogNotifier, NotificationChannel, PaymentNotification, PaymentNotifier, WebhookNotifier};
pub use reconciliation::{ReconciliationApi, ReconciliationConfig, ReconciliationError, ReconciliationReport};
