//! pushprism gateway library entry.
//!
//! Wires YAML configuration, the aggregation core and the self-metrics
//! registry into two axum routers. It is consumed by the binary (`main.rs`)
//! and by integration tests.

pub mod api;
pub mod app_state;
pub mod config;
pub mod obs;
pub mod ops;
pub mod router;
