//! # Directory Cache Facade
//!
//! [`DirectoryCache`] is the single entry point a UI layer talks to. It owns the
//! [`PageStore`], the [`FetchCoordinator`] and one [`LookupController`] per key,
//! and performs no I/O of its own.
//!
//! ## Driving It
//!
//! ```text
//! ui ──resolve(key)──▶ DirectoryCache ──take_pending()──▶ host runs fetches
//!  ▲                        ▲                                   │
//!  └──── Resolution ────────┴────── complete(ticket, outcome) ◀─┘
//! ```
//!
//! 1. `resolve(key)` creates or re-settles the key's lookup and returns its
//!    current [`Resolution`].
//! 2. The host drains [`DirectoryCache::take_pending`] and runs each fetch.
//! 3. Each result goes back through [`DirectoryCache::complete`], which merges it
//!    and settles every live lookup, possibly queueing more fetches.
//!
//! [`crate::directory::Directory`] is a ready-made synchronous host.
//!
//! ## Resets
//!
//! [`DirectoryCache::invalidate_all`] is the only way to clear the store. It is
//! what a successful delete must call: every lookup goes back to `Idle` and the
//! next `resolve` starts from an empty cache.

use crate::config::CacheConfig;
use crate::error::{DirError, Result};
use crate::fetch::{Completion, FetchCoordinator, FetchPayload, PendingFetch, Ticket};
use crate::index::find_by_key;
use crate::lookup::{LookupController, LookupStatus};
use crate::model::Composer;
use crate::store::PageStore;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

/// What the UI gets back for a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub key: String,
    #[serde(flatten)]
    pub status: LookupStatus,
    /// The composer, present once the status is `Resolved`.
    #[serde(skip)]
    pub entity: Option<Composer>,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        matches!(self.status, LookupStatus::Resolved)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.status, LookupStatus::Loading)
    }
}

#[derive(Debug, Default)]
pub struct DirectoryCache {
    store: PageStore,
    coordinator: FetchCoordinator,
    lookups: HashMap<String, LookupController>,
    outbox: Vec<PendingFetch>,
    config: CacheConfig,
}

impl DirectoryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &PageStore {
        &self.store
    }

    /// Move the UI's page pointer. Invalid values are corrected on the next fetch.
    pub fn set_current_page(&mut self, index: i64) {
        self.store.set_current_page_index(index);
    }

    /// Start or continue resolving `key`.
    ///
    /// Repeated calls with nothing new to act on are no-ops that return the same
    /// resolution.
    pub fn resolve(&mut self, key: &str) -> Resolution {
        let lookup = self
            .lookups
            .entry(key.to_string())
            .or_insert_with(|| LookupController::new(key));
        if let Some(pending) = lookup.settle(&mut self.store, &mut self.coordinator, &self.config)
        {
            self.outbox.push(pending);
        }
        self.resolution(key)
    }

    /// Restart a failed lookup. Other states are left alone.
    pub fn retry(&mut self, key: &str) -> Resolution {
        if let Some(lookup) = self.lookups.get_mut(key) {
            if matches!(lookup.status(), LookupStatus::Failed { .. }) {
                info!(key, "retrying failed lookup");
                lookup.reset();
            }
        }
        self.resolve(key)
    }

    /// Current resolution of `key` without settling anything.
    pub fn resolution(&self, key: &str) -> Resolution {
        let status = self
            .lookups
            .get(key)
            .map(LookupController::status)
            .unwrap_or(LookupStatus::Idle);
        let entity = match status {
            LookupStatus::Resolved => find_by_key(&self.store, key).cloned(),
            _ => None,
        };
        Resolution {
            key: key.to_string(),
            status,
            entity,
        }
    }

    /// Fetches queued since the last call. The host must run every one of them
    /// and report each through [`DirectoryCache::complete`].
    pub fn take_pending(&mut self) -> Vec<PendingFetch> {
        std::mem::take(&mut self.outbox)
    }

    pub fn has_pending(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Feed a fetch result back in and settle every lookup.
    ///
    /// Backend failures are absorbed here: the lookups waiting on `ticket` move to
    /// `Failed`, everything else is untouched. Only an unknown ticket is an error.
    pub fn complete(
        &mut self,
        ticket: Ticket,
        outcome: std::result::Result<FetchPayload, String>,
    ) -> Result<()> {
        match self.coordinator.complete(ticket, outcome, &mut self.store) {
            Ok(Completion::Merged(_)) => {}
            Ok(Completion::Discarded) => return Ok(()),
            Err(DirError::FetchFailed { stream, reason }) => {
                for lookup in self.lookups.values_mut() {
                    lookup.on_fetch_failed(ticket, &stream, &reason);
                }
            }
            Err(err) => return Err(err),
        }
        self.settle_all();
        Ok(())
    }

    /// Forget the sheets of `key` and fetch them again, e.g. after a sheet was
    /// saved elsewhere.
    pub fn refresh_sub_collection(&mut self, key: &str) -> Resolution {
        if self.store.reset_sub_collection(key) {
            debug!(key, "sheets reset for refresh");
            if let Some(lookup) = self.lookups.get_mut(key) {
                if lookup.is_terminal() {
                    lookup.reset();
                }
            }
        }
        self.resolve(key)
    }

    /// Clear the store and send every lookup back to `Idle`.
    ///
    /// Fetches still in flight are abandoned; their results are discarded when
    /// they arrive.
    pub fn invalidate_all(&mut self) {
        info!(
            pages = self.store.page_count(),
            lookups = self.lookups.len(),
            "directory cache invalidated"
        );
        self.store.clear();
        self.coordinator.invalidate();
        self.outbox.clear();
        for lookup in self.lookups.values_mut() {
            lookup.reset();
        }
    }

    /// Drop the lookup for a key the UI no longer shows.
    pub fn forget(&mut self, key: &str) -> bool {
        self.lookups.remove(key).is_some()
    }

    pub fn lookup(&self, key: &str) -> Option<&LookupController> {
        self.lookups.get(key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.coordinator.in_flight_count()
    }

    fn settle_all(&mut self) {
        // Sorted so fetches are queued in a stable order.
        let mut keys: Vec<String> = self.lookups.keys().cloned().collect();
        keys.sort();
        for key in keys {
            if let Some(lookup) = self.lookups.get_mut(&key) {
                if let Some(pending) =
                    lookup.settle(&mut self.store, &mut self.coordinator, &self.config)
                {
                    self.outbox.push(pending);
                }
            }
        }
    }
}
