//! # Page Storage
//!
//! The directory is only available from the backend in discrete pages. Everything
//! the cache knows lives in one [`PageStore`]: the pages fetched so far, keyed by
//! page index, plus the page count the server last declared.
//!
//! ## Philosophy
//!
//! - **Pages are the unit**: a page is stored whole and replaced whole. There is
//!   no per-entity merge between two fetches of the same index; last write wins.
//! - **Everything stays queryable**: once fetched, a page answers lookups no
//!   matter where the current page pointer points.
//! - **The pointer self-heals**: the current page index is a hint that may be
//!   stale (left over from an earlier session, or from before a delete). Once the
//!   total page count is known, an out-of-range pointer is reset to page 1.
//!
//! ## Ownership
//!
//! The store does no I/O and knows nothing about requests in flight. It is
//! mutated by the fetch coordinator's merge step and by invalidation only; every
//! other component reads it.
//!
//! ## Layout
//!
//! ```text
//! PageStore
//! ├── pages:             BTreeMap<page index, StoredPage { page, seq }>
//! ├── current_page_index Option<i64>   (raw pointer, may be invalid)
//! └── total_page_count   Option<u32>   (None until the first page lands)
//! ```
//!
//! `seq` is a fetch sequence number. When the same composer shows up on two cached
//! pages (the directory is sorted by `updated_at`, so rows drift between pages),
//! the copy with the higher `seq` is the most recent one.

pub mod page_store;

pub use page_store::{PageStore, StoredPage};

#[cfg(any(test, feature = "test_utils"))]
pub mod fixtures;
