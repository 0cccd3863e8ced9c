pub mod aggregate;
pub mod chat;
pub mod classifier;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod pricing;
