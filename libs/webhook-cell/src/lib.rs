pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use router::webhook_routes;
pub use services::ledger::WebhookLedger;
pub use services::processor::WebhookProcessor;
pub use services::reprocess::ReprocessingTool;
