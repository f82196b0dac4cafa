//! HTTP server for the optipress image optimization service.
//!
//! Exposed as a library so integration tests can build the router and
//! drive it in-process.

pub mod api;
pub mod metrics;
pub mod state;
