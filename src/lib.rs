//! Request guard service
//!
//! Rate limiting and bot protection for the hospital's public website and
//! staff tools. Handlers ask it whether a caller may proceed, record the
//! requests they accept, and operators read traffic statistics.

pub mod api;
pub mod config;
pub mod core;
pub mod models;
pub mod store;
pub mod utils;
