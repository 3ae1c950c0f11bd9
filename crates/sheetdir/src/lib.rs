//! # sheetdir Architecture
//!
//! sheetdir is the data layer behind a sheet-music browser: a **lazy, paginated,
//! de-duplicated cache** of the composer directory. A composer page is addressed by
//! a stable key (`/composer/johann-sebastian-bach`), but the backend only hands out
//! the directory one page at a time. This crate fetches the pages it needs, merges
//! them into a local cache, and keeps re-checking after every fetch until the key
//! resolves or definitely cannot.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Host (directory.rs, or your own event loop)                │
//! │  - Runs fetches against a DirectoryBackend                  │
//! │  - The ONLY place that performs I/O                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Facade (cache.rs)                                          │
//! │  - resolve / retry / complete / invalidate_all              │
//! │  - Queues PendingFetch values, returns Resolution values    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Lookup state machines (lookup.rs)                          │
//! │  - One per key, advanced by an idempotent settle step       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Fetch coordinator (fetch.rs) → Page store (store/)         │
//! │  - Bounds correction, one fetch per stream, merge           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Principle: Sans-IO Core
//!
//! Everything from `cache.rs` inward is plain data and state transitions. A fetch
//! is a value the host executes; its result is a value the host hands back. The
//! same core serves a blocking host, an async runtime, or a browser event loop,
//! and every scenario can be tested by delivering completions by hand.
//!
//! ## Termination
//!
//! The lookup loop is bounded twice over: a walk never fetches a page that is
//! already cached, and `max_directory_fetches` caps the number of directory fetches
//! per lookup. A key that is not on any page ends as "not found", never as an
//! endless "loading".
//!
//! ## Module Overview
//!
//! - [`cache`]: The facade, entry point for UI layers
//! - [`directory`]: Synchronous host over a [`backend::DirectoryBackend`]
//! - [`lookup`]: Per-key state machine
//! - [`fetch`]: Bounds correction, de-duplication, merging
//! - [`index`]: Key → composer lookup over cached pages
//! - [`store`]: Page storage
//! - [`backend`]: Backend contract and the in-memory backend
//! - [`wire`]: JSON request and response bodies
//! - [`model`]: Core data types (`Composer`, `Sheet`, `Page`)
//! - [`config`]: Configuration management
//! - [`error`]: Error types

pub mod backend;
pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod fetch;
pub mod index;
pub mod lookup;
pub mod model;
pub mod store;
pub mod wire;

pub use cache::{DirectoryCache, Resolution};
pub use directory::Directory;
pub use error::{DirError, Result};
pub use lookup::{LookupFailure, LookupStatus};
