//! Runtime registry
//!
//! Maps runtime ids such as `python2.7` to the images, file layout and
//! install tooling used to run functions written for them. The registry is
//! read once from the cluster config and shared read-only afterwards.

mod registry;

pub use registry::*;
