//! Prometheus metrics and health endpoints for the controller

mod prometheus;

pub use self::prometheus::*;
