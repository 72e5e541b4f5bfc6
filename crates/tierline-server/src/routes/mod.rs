pub mod accounts;
pub mod chat;
pub mod checkout;
pub mod config;
pub mod email;
pub mod entitlements;
pub mod health;
pub mod usage;
pub mod webhook;
