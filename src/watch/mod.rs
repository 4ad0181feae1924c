//! EV-015: Polling source watcher that re-triggers cache rebuilds.
//!
//! Each poll expands the entity patterns again (so new files are seen),
//! fingerprints the matches, and diffs against the previous scan. A
//! non-empty diff triggers the rebuilder; the next poll only starts after
//! that rebuild returns.

pub mod changes;
pub mod hasher;

use crate::core::error::ResolutionFailure;
use crate::core::rebuild::{RebuildOutcome, Rebuilder};
use crate::core::resolver;
use changes::Change;
use hasher::Snapshot;
use std::time::Duration;

/// One poll that found changes.
#[derive(Debug)]
pub struct Cycle {
    pub changes: Vec<Change>,
    pub outcome: RebuildOutcome,
}

/// Polls the resolved source set and rebuilds on change.
pub struct Watcher {
    rebuilder: Rebuilder,
    interval: Duration,
    last: Snapshot,
}

impl Watcher {
    /// Create a watcher primed with the current source state.
    pub fn new(rebuilder: Rebuilder, interval: Duration) -> Self {
        let mut watcher = Self {
            rebuilder,
            interval,
            last: Snapshot::new(),
        };
        watcher.last = watcher.scan();
        watcher
    }

    pub fn rebuilder(&self) -> &Rebuilder {
        &self.rebuilder
    }

    /// Fingerprint the files the patterns currently match.
    pub fn scan(&self) -> Snapshot {
        let request = self.rebuilder.request();
        match resolver::expand_patterns(&request.patterns, &request.root) {
            Ok(files) => hasher::snapshot(&files),
            Err(e) => {
                if !matches!(e.failure, ResolutionFailure::NoMatches) {
                    tracing::warn!(error = %e, "cannot expand entity patterns");
                }
                Snapshot::new()
            }
        }
    }

    /// Scan once; rebuild if anything changed since the last scan.
    pub fn poll_once(&mut self) -> Option<Cycle> {
        let current = self.scan();
        let changes = changes::diff(&self.last, &current);
        self.last = current;
        if changes.is_empty() {
            return None;
        }

        for change in &changes {
            tracing::info!(path = %change.path.display(), "{}", change.kind);
        }
        let outcome = self.rebuilder.trigger();
        Some(Cycle { changes, outcome })
    }

    /// Poll until `should_stop` returns true, reporting each cycle.
    pub fn run<S, R>(&mut self, mut should_stop: S, mut report: R)
    where
        S: FnMut() -> bool,
        R: FnMut(&Cycle),
    {
        while !should_stop() {
            if let Some(cycle) = self.poll_once() {
                report(&cycle);
            }
            std::thread::sleep(self.interval);
        }
    }
}
