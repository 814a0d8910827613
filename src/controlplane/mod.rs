//! Control Plane Module
//!
//! Protocol-facing side of the plugin: the controller adapter, its metrics
//! and the REST API serving it.

pub mod api;
pub mod controller;
pub mod metrics;

pub use api::*;
pub use controller::ControllerAdapter;
pub use metrics::Metrics;
