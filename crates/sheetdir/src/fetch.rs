//! # Fetch Coordination
//!
//! The coordinator sits between lookups and the network. It never performs I/O
//! itself: a request produces a [`PendingFetch`] that the host executes however it
//! likes (HTTP client, worker, test harness), and the host reports back through
//! [`FetchCoordinator::complete`].
//!
//! ## Guarantees
//!
//! 1. **Bounds correction.** A directory page index that is absent, zero,
//!    negative, or past the last known page count becomes page 1, and the store's
//!    pointer is rewritten to 1. The bad index is never sent.
//! 2. **One fetch per stream.** The directory is one stream; each composer's
//!    sheets are another. While a stream has a request in flight, further
//!    requests on it join the outstanding [`Ticket`] instead of issuing a new
//!    fetch.
//! 3. **Merge on completion.** Directory pages are upserted, sheet pages are
//!    attached to their composer. The stream is freed in every case, including
//!    failure, so a failed fetch never blocks a retry.
//! 4. **Failures stay contained.** A failed fetch is reported as
//!    [`DirError::FetchFailed`] and leaves cached pages untouched.
//!
//! ## Generations
//!
//! Each ticket remembers the cache generation it was issued in. Invalidation
//! bumps the generation and forgets every in-flight request; a completion that
//! arrives afterwards for an old ticket is discarded rather than merged into the
//! freshly cleared store.

use crate::error::{DirError, Result};
use crate::model::{Composer, Page, PageRequest, Sheet, SubCollectionRequest};
use crate::store::PageStore;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Handle for one in-flight fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket {
    id: u64,
    generation: u64,
}

impl Ticket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.id)
    }
}

/// A logical request stream. At most one fetch per stream is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FetchStream {
    Directory,
    SubCollection(String),
}

impl fmt::Display for FetchStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchStream::Directory => write!(f, "directory"),
            FetchStream::SubCollection(key) => write!(f, "sheets:{}", key),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchRequest {
    Directory(PageRequest),
    SubCollection(SubCollectionRequest),
}

impl FetchRequest {
    pub fn stream(&self) -> FetchStream {
        match self {
            FetchRequest::Directory(_) => FetchStream::Directory,
            FetchRequest::SubCollection(req) => FetchStream::SubCollection(req.parent_key.clone()),
        }
    }
}

/// A fetch the host must execute and report back with [`FetchCoordinator::complete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFetch {
    pub ticket: Ticket,
    pub request: FetchRequest,
}

/// What the backend returned for a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchPayload {
    Directory(Page<Composer>),
    SubCollection(Page<Sheet>),
}

/// Outcome of a request call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// A new fetch was created; the host must run it.
    Issued(PendingFetch),
    /// The stream was busy; the caller waits on the existing ticket.
    Joined(Ticket),
}

impl Dispatch {
    pub fn ticket(&self) -> Ticket {
        match self {
            Dispatch::Issued(pending) => pending.ticket,
            Dispatch::Joined(ticket) => *ticket,
        }
    }

    pub fn into_pending(self) -> Option<PendingFetch> {
        match self {
            Dispatch::Issued(pending) => Some(pending),
            Dispatch::Joined(_) => None,
        }
    }
}

/// Successful outcome of [`FetchCoordinator::complete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Merged(FetchStream),
    /// The ticket predates the last invalidation; nothing was merged.
    Discarded,
}

/// Map a requested directory page onto a valid one.
///
/// Absent, zero, negative, and past-the-end indexes become 1. Past-the-end is
/// only detectable once the page count is known.
pub fn correct_page_index(requested: Option<i64>, total: Option<u32>) -> u32 {
    let Some(index) = requested else {
        return 1;
    };
    if index < 1 {
        return 1;
    }
    if let Some(total) = total {
        if index > i64::from(total) {
            return 1;
        }
    }
    u32::try_from(index).unwrap_or(1)
}

#[derive(Debug)]
struct InFlight {
    ticket: Ticket,
    request: FetchRequest,
}

#[derive(Debug, Default)]
pub struct FetchCoordinator {
    in_flight: HashMap<FetchStream, InFlight>,
    next_id: u64,
    generation: u64,
}

impl FetchCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a directory page, correcting the index against `store`.
    pub fn request_directory(
        &mut self,
        requested: Option<i64>,
        sort_by: &str,
        store: &mut PageStore,
    ) -> Dispatch {
        if let Some(existing) = self.in_flight.get(&FetchStream::Directory) {
            debug!(ticket = %existing.ticket, "directory fetch already in flight, joining");
            return Dispatch::Joined(existing.ticket);
        }

        let page = correct_page_index(requested, store.total_page_count());
        if requested != Some(i64::from(page)) {
            debug!(
                requested = ?requested,
                total = ?store.total_page_count(),
                "invalid page index corrected to 1"
            );
            store.set_current_page_index(1);
        }

        self.issue(FetchRequest::Directory(PageRequest {
            page,
            sort_by: sort_by.to_string(),
        }))
    }

    /// Request the sheets of one composer.
    pub fn request_sub_collection(&mut self, parent_key: &str, sort_by: &str) -> Dispatch {
        let stream = FetchStream::SubCollection(parent_key.to_string());
        if let Some(existing) = self.in_flight.get(&stream) {
            debug!(ticket = %existing.ticket, %stream, "sheet fetch already in flight, joining");
            return Dispatch::Joined(existing.ticket);
        }
        self.issue(FetchRequest::SubCollection(SubCollectionRequest::for_parent(
            parent_key, sort_by,
        )))
    }

    /// Report the outcome of a fetch and merge it into `store`.
    ///
    /// A backend failure (or a payload of the wrong kind) frees the stream and
    /// returns [`DirError::FetchFailed`]. Completing a ticket this coordinator
    /// never issued, or one already completed, is [`DirError::UnknownTicket`].
    pub fn complete(
        &mut self,
        ticket: Ticket,
        outcome: std::result::Result<FetchPayload, String>,
        store: &mut PageStore,
    ) -> Result<Completion> {
        if ticket.generation != self.generation {
            debug!(%ticket, "completion from before invalidation discarded");
            return Ok(Completion::Discarded);
        }

        let stream = self
            .in_flight
            .iter()
            .find(|(_, entry)| entry.ticket == ticket)
            .map(|(stream, _)| stream.clone())
            .ok_or(DirError::UnknownTicket(ticket.id))?;
        let entry = self
            .in_flight
            .remove(&stream)
            .ok_or(DirError::UnknownTicket(ticket.id))?;

        let payload = match outcome {
            Ok(payload) => payload,
            Err(reason) => {
                warn!(%ticket, %stream, %reason, "fetch failed");
                return Err(DirError::FetchFailed {
                    stream: stream.to_string(),
                    reason,
                });
            }
        };

        match (entry.request, payload) {
            (FetchRequest::Directory(req), FetchPayload::Directory(page)) => {
                debug!(
                    %ticket,
                    requested = req.page,
                    page = page.index,
                    total = page.total_pages,
                    rows = page.items.len(),
                    "directory page merged"
                );
                store.upsert_page(page);
            }
            (FetchRequest::SubCollection(req), FetchPayload::SubCollection(page)) => {
                let rows = page.items.len();
                if store.attach_sub_collection(&req.parent_key, page.items) {
                    debug!(%ticket, key = %req.parent_key, rows, "sheets merged");
                } else {
                    debug!(%ticket, key = %req.parent_key, "sheets for uncached composer dropped");
                }
            }
            _ => {
                warn!(%ticket, %stream, "response kind does not match request");
                return Err(DirError::FetchFailed {
                    stream: stream.to_string(),
                    reason: "response kind does not match request".to_string(),
                });
            }
        }

        Ok(Completion::Merged(stream))
    }

    pub fn is_in_flight(&self, ticket: Ticket) -> bool {
        self.in_flight.values().any(|entry| entry.ticket == ticket)
    }

    pub fn is_stream_busy(&self, stream: &FetchStream) -> bool {
        self.in_flight.contains_key(stream)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Forget every in-flight request. Their late completions are discarded.
    pub fn invalidate(&mut self) {
        if !self.in_flight.is_empty() {
            info!(
                abandoned = self.in_flight.len(),
                "in-flight fetches abandoned by invalidation"
            );
        }
        self.in_flight.clear();
        self.generation += 1;
    }

    fn issue(&mut self, request: FetchRequest) -> Dispatch {
        self.next_id += 1;
        let ticket = Ticket {
            id: self.next_id,
            generation: self.generation,
        };
        let stream = request.stream();
        debug!(%ticket, %stream, "fetch issued");
        self.in_flight.insert(
            stream,
            InFlight {
                ticket,
                request: request.clone(),
            },
        );
        Dispatch::Issued(PendingFetch { ticket, request })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DEFAULT_SORT;
    use crate::store::fixtures::{directory_page, sheet};

    fn issued(dispatch: Dispatch) -> PendingFetch {
        dispatch.into_pending().expect("expected a new fetch")
    }

    fn directory_request(pending: &PendingFetch) -> &PageRequest {
        match &pending.request {
            FetchRequest::Directory(req) => req,
            other => panic!("expected directory request, got {:?}", other),
        }
    }

    // --- Bounds Correction ---

    #[test]
    fn correct_page_index_substitutes_first_page() {
        assert_eq!(correct_page_index(None, None), 1);
        assert_eq!(correct_page_index(Some(0), Some(3)), 1);
        assert_eq!(correct_page_index(Some(-4), Some(3)), 1);
        assert_eq!(correct_page_index(Some(4), Some(3)), 1);
        assert_eq!(correct_page_index(Some(3), Some(3)), 3);
        assert_eq!(correct_page_index(Some(7), None), 7);
        assert_eq!(correct_page_index(Some(1), Some(0)), 1);
    }

    #[test]
    fn request_beyond_total_goes_to_page_one() {
        let mut store = PageStore::new();
        store.upsert_page(directory_page(1, 2, &["Bach"]));
        store.set_current_page_index(5);
        let mut coordinator = FetchCoordinator::new();

        let pending = issued(coordinator.request_directory(
            store.current_page_index(),
            DEFAULT_SORT,
            &mut store,
        ));

        assert_eq!(directory_request(&pending).page, 1);
        assert_eq!(store.current_page_index(), Some(1));
    }

    #[test]
    fn request_for_zero_or_negative_goes_to_page_one() {
        for bad in [0, -1] {
            let mut store = PageStore::new();
            let mut coordinator = FetchCoordinator::new();
            let pending =
                issued(coordinator.request_directory(Some(bad), DEFAULT_SORT, &mut store));
            assert_eq!(directory_request(&pending).page, 1);
        }
    }

    #[test]
    fn valid_request_keeps_its_page_and_pointer() {
        let mut store = PageStore::new();
        store.upsert_page(directory_page(1, 3, &["Bach"]));
        store.set_current_page_index(1);
        let mut coordinator = FetchCoordinator::new();

        let pending = issued(coordinator.request_directory(Some(3), DEFAULT_SORT, &mut store));

        assert_eq!(directory_request(&pending).page, 3);
        assert_eq!(store.current_page_index(), Some(1));
    }

    // --- De-duplication ---

    #[test]
    fn second_directory_request_joins_first() {
        let mut store = PageStore::new();
        let mut coordinator = FetchCoordinator::new();

        let first = coordinator.request_directory(Some(1), DEFAULT_SORT, &mut store);
        let second = coordinator.request_directory(Some(2), DEFAULT_SORT, &mut store);

        assert!(matches!(first, Dispatch::Issued(_)));
        assert_eq!(second, Dispatch::Joined(first.ticket()));
        assert_eq!(coordinator.in_flight_count(), 1);
    }

    #[test]
    fn sheet_streams_are_per_parent() {
        let mut coordinator = FetchCoordinator::new();

        let bach = coordinator.request_sub_collection("bach", DEFAULT_SORT);
        let bach_again = coordinator.request_sub_collection("bach", DEFAULT_SORT);
        let chopin = coordinator.request_sub_collection("chopin", DEFAULT_SORT);

        assert_eq!(bach_again, Dispatch::Joined(bach.ticket()));
        assert!(matches!(chopin, Dispatch::Issued(_)));
        assert_ne!(bach.ticket(), chopin.ticket());
        assert!(coordinator.is_stream_busy(&FetchStream::SubCollection("bach".into())));
        assert!(!coordinator.is_stream_busy(&FetchStream::Directory));
    }

    // --- Completion ---

    #[test]
    fn completion_merges_page_and_frees_stream() {
        let mut store = PageStore::new();
        let mut coordinator = FetchCoordinator::new();
        let pending = issued(coordinator.request_directory(None, DEFAULT_SORT, &mut store));

        let completion = coordinator
            .complete(
                pending.ticket,
                Ok(FetchPayload::Directory(directory_page(1, 1, &["Bach"]))),
                &mut store,
            )
            .unwrap();

        assert_eq!(completion, Completion::Merged(FetchStream::Directory));
        assert!(store.contains_page(1));
        assert!(!coordinator.is_in_flight(pending.ticket));
        assert!(matches!(
            coordinator.request_directory(None, DEFAULT_SORT, &mut store),
            Dispatch::Issued(_)
        ));
    }

    #[test]
    fn sheet_completion_attaches_rows() {
        let mut store = PageStore::new();
        store.upsert_page(directory_page(1, 1, &["Bach"]));
        let mut coordinator = FetchCoordinator::new();
        let pending = issued(coordinator.request_sub_collection("bach", DEFAULT_SORT));

        coordinator
            .complete(
                pending.ticket,
                Ok(FetchPayload::SubCollection(crate::model::Page::new(
                    1,
                    1,
                    vec![sheet(1, "Cello Suite No. 1", "Bach")],
                ))),
                &mut store,
            )
            .unwrap();

        assert_eq!(store.page(1).unwrap().items[0].sheets.sheets().len(), 1);
    }

    #[test]
    fn failure_frees_stream_and_keeps_cache() {
        let mut store = PageStore::new();
        store.upsert_page(directory_page(1, 2, &["Bach"]));
        let mut coordinator = FetchCoordinator::new();
        let pending = issued(coordinator.request_directory(Some(2), DEFAULT_SORT, &mut store));

        let result =
            coordinator.complete(pending.ticket, Err("502 Bad Gateway".into()), &mut store);

        match result {
            Err(DirError::FetchFailed { stream, reason }) => {
                assert_eq!(stream, "directory");
                assert_eq!(reason, "502 Bad Gateway");
            }
            other => panic!("expected FetchFailed, got {:?}", other),
        }
        assert_eq!(coordinator.in_flight_count(), 0);
        assert!(store.contains_page(1));
        assert_eq!(store.total_page_count(), Some(2));
    }

    #[test]
    fn mismatched_payload_is_a_failure() {
        let mut store = PageStore::new();
        let mut coordinator = FetchCoordinator::new();
        let pending = issued(coordinator.request_sub_collection("bach", DEFAULT_SORT));

        let result = coordinator.complete(
            pending.ticket,
            Ok(FetchPayload::Directory(directory_page(1, 1, &["Bach"]))),
            &mut store,
        );

        assert!(matches!(result, Err(DirError::FetchFailed { .. })));
        assert!(store.is_empty());
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[test]
    fn completing_twice_is_unknown_ticket() {
        let mut store = PageStore::new();
        let mut coordinator = FetchCoordinator::new();
        let pending = issued(coordinator.request_directory(None, DEFAULT_SORT, &mut store));
        let page = FetchPayload::Directory(directory_page(1, 1, &["Bach"]));

        coordinator
            .complete(pending.ticket, Ok(page.clone()), &mut store)
            .unwrap();
        let again = coordinator.complete(pending.ticket, Ok(page), &mut store);

        assert!(matches!(again, Err(DirError::UnknownTicket(id)) if id == pending.ticket.id()));
    }

    #[test]
    fn completion_after_invalidation_is_discarded() {
        let mut store = PageStore::new();
        let mut coordinator = FetchCoordinator::new();
        let pending = issued(coordinator.request_directory(None, DEFAULT_SORT, &mut store));

        store.clear();
        coordinator.invalidate();

        let completion = coordinator
            .complete(
                pending.ticket,
                Ok(FetchPayload::Directory(directory_page(1, 1, &["Bach"]))),
                &mut store,
            )
            .unwrap();

        assert_eq!(completion, Completion::Discarded);
        assert!(store.is_empty());
        assert_eq!(coordinator.generation(), 1);
    }
}
