//! CLI subcommand implementations

pub mod bench;
pub mod metrics;
pub mod predict;
pub mod status;
