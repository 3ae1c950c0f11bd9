//! # Lookup State Machine
//!
//! A [`LookupController`] drives one composer key to a terminal state. It is
//! advanced by a single trigger, [`LookupController::settle`], which the host
//! calls after every event that might matter (a page arriving, a sheet list
//! arriving, the consumer asking again).
//!
//! ## States
//!
//! ```text
//!             key absent                       key present, sheets Unset
//!   Idle ───────────────────▶ AwaitingDirectory ─────────────────────────▶ AwaitingSubCollection
//!    │                          │   ▲      │                                       │
//!    │ key present,             │   └──────┘ page arrived, key still absent        │ sheets arrived
//!    │ sheets Unset             │            (next uncached page)                  ▼
//!    └──────────────────────────┼──────────────────────────────────────────▶    Resolved
//!                               │ range exhausted / fetch cap hit
//!                               ▼
//!                    Failed(KeyNotFound)      any awaited fetch fails ─▶ Failed(FetchFailed)
//! ```
//!
//! ## Choosing the Next Page
//!
//! The first directory request uses the store's current page pointer (corrected
//! by the coordinator if it is out of range). If that page is already cached, the
//! lowest uncached page in `1..=total` is requested instead, so a page is never
//! fetched twice by the same walk. Once every page is cached and the key is still
//! missing, the key does not exist.
//!
//! ## Losing a Resolution
//!
//! `Resolved` holds only while the store still has the composer with its sheets.
//! A page re-fetch replaces the sheets with `Unset`, and a smaller page count can
//! drop the page altogether. The next settle notices, goes back to `Idle` and
//! walks again.
//!
//! ## Idempotence
//!
//! While the awaited ticket is still in flight, or once the controller is in a
//! terminal state, `settle` returns without touching anything. Calling it
//! redundantly is how the host guarantees progress, so it must never issue a
//! second fetch for the same wait.

use crate::config::CacheConfig;
use crate::fetch::{correct_page_index, Dispatch, FetchCoordinator, PendingFetch, Ticket};
use crate::index::find_by_key;
use crate::store::PageStore;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

/// Why a lookup ended without a composer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LookupFailure {
    /// The awaited fetch on `stream` (`directory` or `sheets:<key>`) failed.
    FetchFailed { stream: String, reason: String },
    KeyNotFound,
}

impl fmt::Display for LookupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupFailure::FetchFailed { stream, reason } => {
                write!(f, "fetch failed ({}): {}", stream, reason)
            }
            LookupFailure::KeyNotFound => write!(f, "not found"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupState {
    Idle,
    AwaitingDirectory { ticket: Ticket },
    AwaitingSubCollection { ticket: Ticket },
    Resolved,
    Failed(LookupFailure),
}

impl LookupState {
    fn name(&self) -> &'static str {
        match self {
            LookupState::Idle => "idle",
            LookupState::AwaitingDirectory { .. } => "awaiting_directory",
            LookupState::AwaitingSubCollection { .. } => "awaiting_sub_collection",
            LookupState::Resolved => "resolved",
            LookupState::Failed(_) => "failed",
        }
    }

    fn awaited(&self) -> Option<Ticket> {
        match self {
            LookupState::AwaitingDirectory { ticket }
            | LookupState::AwaitingSubCollection { ticket } => Some(*ticket),
            _ => None,
        }
    }
}

/// Consumer-facing status of a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LookupStatus {
    Idle,
    Loading,
    Resolved,
    Failed { failure: LookupFailure },
}

impl From<&LookupState> for LookupStatus {
    fn from(state: &LookupState) -> Self {
        match state {
            LookupState::Idle => LookupStatus::Idle,
            LookupState::AwaitingDirectory { .. } | LookupState::AwaitingSubCollection { .. } => {
                LookupStatus::Loading
            }
            LookupState::Resolved => LookupStatus::Resolved,
            LookupState::Failed(failure) => LookupStatus::Failed {
                failure: failure.clone(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct LookupController {
    key: String,
    state: LookupState,
    directory_fetches: u32,
}

impl LookupController {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            state: LookupState::Idle,
            directory_fetches: 0,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> &LookupState {
        &self.state
    }

    pub fn status(&self) -> LookupStatus {
        LookupStatus::from(&self.state)
    }

    /// Directory fetches this lookup has issued since it last left `Idle`.
    ///
    /// Joining a fetch another lookup issued does not count.
    pub fn directory_fetches(&self) -> u32 {
        self.directory_fetches
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, LookupState::Resolved | LookupState::Failed(_))
    }

    pub fn awaits(&self, ticket: Ticket) -> bool {
        self.state.awaited() == Some(ticket)
    }

    /// Re-evaluate against the current store and decide the next step.
    ///
    /// Returns a fetch only when a new one was issued; joining a fetch already in
    /// flight returns `None`.
    pub fn settle(
        &mut self,
        store: &mut PageStore,
        coordinator: &mut FetchCoordinator,
        config: &CacheConfig,
    ) -> Option<PendingFetch> {
        if self.state == LookupState::Resolved && !self.still_resolved(store) {
            debug!(key = %self.key, "resolved composer left the cache, walking again");
            self.reset();
        }
        if self.is_terminal() {
            return None;
        }
        if let Some(ticket) = self.state.awaited() {
            if coordinator.is_in_flight(ticket) {
                return None;
            }
        }

        let found = find_by_key(store, &self.key).map(|composer| composer.sheets.is_unset());
        match found {
            Some(false) => {
                self.transition(LookupState::Resolved);
                None
            }
            Some(true) => {
                let dispatch =
                    coordinator.request_sub_collection(&self.key, &config.sub_collection_sort_by);
                self.transition(LookupState::AwaitingSubCollection {
                    ticket: dispatch.ticket(),
                });
                dispatch.into_pending()
            }
            None => self.request_next_page(store, coordinator, config),
        }
    }

    /// Mark the lookup failed if it was waiting on `ticket`.
    pub fn on_fetch_failed(&mut self, ticket: Ticket, stream: &str, reason: &str) -> bool {
        if !self.awaits(ticket) {
            return false;
        }
        self.transition(LookupState::Failed(LookupFailure::FetchFailed {
            stream: stream.to_string(),
            reason: reason.to_string(),
        }));
        true
    }

    /// Return to `Idle` so the next settle starts over.
    pub fn reset(&mut self) {
        self.directory_fetches = 0;
        self.transition(LookupState::Idle);
    }

    /// A page re-fetch or a shrinking page count can drop the composer or its
    /// sheets after the lookup resolved.
    fn still_resolved(&self, store: &PageStore) -> bool {
        find_by_key(store, &self.key).is_some_and(|composer| !composer.sheets.is_unset())
    }

    fn request_next_page(
        &mut self,
        store: &mut PageStore,
        coordinator: &mut FetchCoordinator,
        config: &CacheConfig,
    ) -> Option<PendingFetch> {
        if self.directory_fetches >= config.max_directory_fetches {
            info!(
                key = %self.key,
                fetches = self.directory_fetches,
                "directory fetch cap reached"
            );
            self.transition(LookupState::Failed(LookupFailure::KeyNotFound));
            return None;
        }

        if store.total_page_count() == Some(0) {
            info!(key = %self.key, "directory is empty");
            self.transition(LookupState::Failed(LookupFailure::KeyNotFound));
            return None;
        }

        let pointer = store.current_page_index();
        let pointed = correct_page_index(pointer, store.total_page_count());
        let requested = if !store.contains_page(pointed) {
            pointer
        } else {
            match store.missing_pages().first() {
                Some(page) => Some(i64::from(*page)),
                None => {
                    info!(
                        key = %self.key,
                        pages = store.page_count(),
                        "every directory page searched"
                    );
                    self.transition(LookupState::Failed(LookupFailure::KeyNotFound));
                    return None;
                }
            }
        };

        let dispatch = coordinator.request_directory(requested, &config.sort_by, store);
        self.transition(LookupState::AwaitingDirectory {
            ticket: dispatch.ticket(),
        });
        match dispatch {
            Dispatch::Issued(pending) => {
                self.directory_fetches += 1;
                Some(pending)
            }
            Dispatch::Joined(_) => None,
        }
    }

    fn transition(&mut self, next: LookupState) {
        if self.state != next {
            debug!(
                key = %self.key,
                from = self.state.name(),
                to = next.name(),
                "lookup transition"
            );
            self.state = next;
        }
    }
}
