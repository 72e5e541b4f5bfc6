pub mod checkout;
pub mod coach;
pub mod config;
pub mod db;
pub mod entitlement;
pub mod error;
pub mod history;
pub mod io;
pub mod ledger;
pub mod meter;
pub mod paths;
pub mod reconcile;
pub mod session;
pub mod signature;
pub mod tier;

pub use error::{Result, TierlineError};
