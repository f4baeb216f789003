//! CostGuard service: HTTP API and configuration for the analytics pipeline

pub mod api;
pub mod config;
