pub mod addresses;
pub mod cli;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod export;
pub mod fetch;
pub mod http;
pub mod indexer;
pub mod ledger;
pub mod pipeline;
pub mod retry;
pub mod rewards;
pub mod snapshot;
pub mod source;
pub mod types;

pub use error::{AppError, AppResult};
