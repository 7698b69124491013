//! Native implementations of the core traits: processes are launched
//! directly on the host through tokio, and toolchains are plain binaries on
//! `PATH`.

pub mod checker;
pub mod executor;
pub mod langs;
pub mod runner;
pub mod runner_report;
pub mod strategies;
