//! Snapsafe - cross-account RDS cluster snapshot replication
//!
//! The live account copies its newest automated cluster snapshot, shares the copy
//! with a failsafe account and announces it over SNS. The failsafe account pulls
//! the announced copy in locally and prunes copies past their retention.

pub mod config;
pub mod consumer;
pub mod directory;
pub mod error;
pub mod event;
pub mod handler;
pub mod notify;
pub mod provider;
pub mod publisher;
pub mod rds;
pub mod retention;
pub mod snapshot;
pub mod waiter;

#[cfg(test)]
mod memory;

pub use error::{Result, SnapshotError};
