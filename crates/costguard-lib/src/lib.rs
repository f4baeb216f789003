//! Cost analytics library
//!
//! This crate provides the core functionality for:
//! - Aggregating cluster resource usage and allocating the cloud bill to namespaces
//! - Period-over-period comparisons and linear cost forecasts
//! - Rule-based right-sizing recommendations
//! - Store interfaces, the job scheduler, health checks and observability

pub mod analyzer;
pub mod config;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod period;
pub mod pipeline;
pub mod scheduler;
pub mod store;

pub use config::AnalyticsConfig;
pub use error::{Analysis, ConfigError, PipelineError, StoreError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{PipelineMetrics, StructuredLogger};
pub use pipeline::Pipeline;
