//! realty-crm: client tier of a residential real-estate CRM
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod api;
pub mod pricing;
pub mod tracker;
pub mod grid;
pub mod notify;
pub mod storage;
