//! EV-007: Coalesced rebuilds. At most one build + write is in flight.
//!
//! A trigger that arrives while a rebuild is running is dropped rather than
//! queued. Watchers re-arm after a rebuild completes, so the next change is
//! picked up by the next trigger.

use super::cache;
use super::error::Error;
use super::types::BuildRequest;
use crate::loader::ModuleLoader;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// Result of one trigger.
#[derive(Debug)]
pub enum RebuildOutcome {
    Rebuilt { path: PathBuf, entities: usize },
    /// Another rebuild was already in flight
    Skipped,
    Failed(Error),
}

/// Guards `build + write` with an in-flight flag.
pub struct Rebuilder {
    request: BuildRequest,
    loader: Box<dyn ModuleLoader + Send + Sync>,
    in_flight: AtomicBool,
}

impl Rebuilder {
    pub fn new(request: BuildRequest, loader: Box<dyn ModuleLoader + Send + Sync>) -> Self {
        Self {
            request,
            loader,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn request(&self) -> &BuildRequest {
        &self.request
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one rebuild unless one is already running.
    pub fn trigger(&self) -> RebuildOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("rebuild already in flight; trigger dropped");
            return RebuildOutcome::Skipped;
        }

        // Reset on every exit path
        struct ResetGuard<'a>(&'a AtomicBool);
        impl Drop for ResetGuard<'_> {
            fn drop(&mut self) {
                self.0.store(false, Ordering::Release);
            }
        }
        let _reset_guard = ResetGuard(&self.in_flight);

        match cache::build_and_write(&self.request, self.loader.as_ref()) {
            Ok((path, cache)) => RebuildOutcome::Rebuilt {
                path,
                entities: cache.entities.len(),
            },
            Err(e) => {
                tracing::warn!(error = %e, "schema cache rebuild failed");
                RebuildOutcome::Failed(e)
            }
        }
    }
}
