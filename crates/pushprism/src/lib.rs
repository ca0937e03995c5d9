//! Top-level facade crate for pushprism.
//!
//! Re-exports the aggregation core and the gateway library so users can depend on a single crate.

pub mod core {
    pub use pushprism_core::*;
}

pub mod gateway {
    pub use pushprism_gateway::*;
}
