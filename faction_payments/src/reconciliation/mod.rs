mod api;
mod config;
mod errors;
mod report;

pub use api::ReconciliationApi;
pub use config::ReconciliationConfig;
pub use errors::ReconciliationError;
pub use report::ReconciliationReport;
