pub mod audit;
pub mod classify;
pub mod config;
pub mod diag;
pub mod exec;
pub mod globus;
pub mod ledger;
pub mod lock;
pub mod paths;
pub mod pipeline;
pub mod timestamp;
pub mod transfer;
pub mod util;
pub mod warn;
pub mod watcher;
