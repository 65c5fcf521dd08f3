//! DIPBUYER — simulated dip-buying investment session
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod analysis;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod ledger;
pub mod sources;
pub mod storage;
pub mod types;
