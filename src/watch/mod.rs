// src/watch/mod.rs

//! Secondary output sources.
//!
//! Only the output tail watcher lives here: it polls files a script writes
//! next to itself and feeds new lines into the execution's output. It knows
//! nothing about the dispatcher or statuses; the process controller decides
//! when to start and stop it.

pub mod tail;

pub use tail::{candidate_dirs, spawn_tail_watcher, OutputTail, TailHandle, TailSettings};
