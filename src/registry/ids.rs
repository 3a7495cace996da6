// src/registry/ids.rs

//! Record id generation.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

/// Generates ids of the form `exec_20261019T103015123_3fa2_9c01_7`:
/// wall-clock milliseconds, a per-generator salt, a random component and a
/// monotonically increasing sequence number. The sequence keeps ids unique
/// even when many records are created within the same millisecond.
#[derive(Debug)]
pub struct IdGenerator {
    salt: u16,
    seq: AtomicU64,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            salt: rand::random::<u16>(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn execution_id(&self) -> String {
        self.next("exec")
    }

    pub fn batch_id(&self) -> String {
        self.next("batch")
    }

    fn next(&self, prefix: &str) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let timestamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
        let random = rand::random::<u16>();
        format!("{prefix}_{timestamp}_{:04x}_{random:04x}_{seq}", self.salt)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn rapid_ids_are_unique() {
        let ids = IdGenerator::new();
        let seen: HashSet<String> = (0..10_000).map(|_| ids.execution_id()).collect();
        assert_eq!(seen.len(), 10_000);
    }

    #[test]
    fn prefixes_distinguish_record_kinds() {
        let ids = IdGenerator::new();
        assert!(ids.execution_id().starts_with("exec_"));
        assert!(ids.batch_id().starts_with("batch_"));
    }
}
