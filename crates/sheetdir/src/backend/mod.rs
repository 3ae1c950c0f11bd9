//! # Backend Contract
//!
//! The backend is an external collaborator. The cache only needs three calls from
//! it, captured by [`DirectoryBackend`]; how the backend paginates, sorts, or
//! stores anything is its own business.
//!
//! ## Implementations
//!
//! - [`mem::MemBackend`]: in-memory backend with server-side paging, a request
//!   log and failure injection. Used by the test suites.
//!
//! HTTP hosts implement the trait on top of their client of choice and decode
//! response bodies with [`crate::wire`].

use crate::error::Result;
use crate::model::{Composer, Page, PageRequest, Sheet, SubCollectionRequest};

pub mod mem;

/// The three backend calls the directory cache consumes.
///
/// Methods take `&self`; implementations that need to mutate (request logs,
/// connection pools) use interior mutability.
pub trait DirectoryBackend {
    /// One page of the composer directory, echoing the page index it answered
    /// for and the total page count.
    fn fetch_directory_page(&self, request: &PageRequest) -> Result<Page<Composer>>;

    /// The sheets of exactly one composer.
    fn fetch_sub_collection(&self, request: &SubCollectionRequest) -> Result<Page<Sheet>>;

    /// Delete a composer. On success the caller must invalidate the whole cache.
    fn delete_entity(&self, key: &str) -> Result<()>;
}
