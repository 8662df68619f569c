pub mod config;
pub mod correlation;
pub mod feed;
pub mod ledger;
pub mod observability;
pub mod profiles;
pub mod risk;
pub mod scheduler;
pub mod snapshot;
pub mod source;
pub mod summary;
pub mod types;
