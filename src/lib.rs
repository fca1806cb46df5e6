//! Funding Console Library
//!
//! Monitoring and configuration console for a cross-exchange funding-rate
//! arbitrage system: polls the stats and config services, maps payloads
//! into display-ready views and pushes configuration edits back.

pub mod api;
pub mod config;
pub mod pages;
pub mod polling;
pub mod types;
pub mod view_model;

#[cfg(feature = "dashboard")]
pub mod dashboard;
