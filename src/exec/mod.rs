// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running test scripts, using
//! `tokio::process::Command`, and reporting back how each run ended.
//!
//! - [`backend`] provides the `ExecutionBackend` trait the dispatcher drives,
//!   plus the `Job` / `RunOutcome` types crossing that seam.
//! - [`controller`] is the production backend: spawn, stream, watchdog,
//!   cancellation.
//! - [`command`] builds the child command (interpreter, params, environment).
//! - [`decode`] turns raw output bytes into text lines.
//! - [`terminate`] implements the termination escalation chain.
//! - [`tree`] abstracts suspend/resume/kill over a whole process tree.

pub mod backend;
pub mod command;
pub mod controller;
pub mod decode;
pub mod terminate;
pub mod tree;

pub use backend::{ExecutionBackend, Job, RunContext, RunOutcome};
pub use command::LaunchSpec;
pub use controller::{ProcessController, TailWiring, FILE_LINE_PREFIX};
pub use tree::{platform_tree_control, ProcessTreeControl};
