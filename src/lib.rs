//! Kubeless Function controller
//!
//! Reconciles `Function`, `CronJobTrigger` and `HTTPTrigger` resources into
//! the ConfigMaps, Services, Deployments, autoscalers, CronJobs and Ingresses
//! that run and expose serverless functions.

pub mod cluster;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod reconcilers;
pub mod resources;
pub mod runtimes;

pub use error::{Error, Result};
