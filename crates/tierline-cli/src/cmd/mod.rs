pub mod account;
pub mod check;
pub mod config;
pub mod history;
pub mod init;
pub mod reconcile;
pub mod serve;
pub mod tier;
pub mod usage;
