//! Subcommand implementations

pub mod costs;
pub mod efficiency;
pub mod jobs;
pub mod recommendations;
