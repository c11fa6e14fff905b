pub mod ledger;
pub mod processor;
pub mod reprocess;
