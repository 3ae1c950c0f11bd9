//! # Synchronous Host
//!
//! [`Directory`] pairs a [`DirectoryCache`] with a [`DirectoryBackend`] and runs
//! the cache's pending fetches inline until nothing is left to do. It is the
//! simplest possible host for the sans-IO core: every `resolve` returns a
//! settled answer (`Resolved` or `Failed`), never `Loading`.
//!
//! Event-loop hosts that want fetches to overlap should drive
//! [`DirectoryCache`] directly instead.

use crate::backend::DirectoryBackend;
use crate::cache::{DirectoryCache, Resolution};
use crate::config::CacheConfig;
use crate::error::{DirError, Result};
use crate::fetch::{FetchPayload, FetchRequest};
use crate::lookup::{LookupFailure, LookupStatus};
use crate::index::find_by_key;
use crate::model::{safe_name, Composer, PLACEHOLDER_COMPOSER};
use tracing::{info, warn};

pub struct Directory<B: DirectoryBackend> {
    cache: DirectoryCache,
    backend: B,
}

impl<B: DirectoryBackend> Directory<B> {
    pub fn new(backend: B, config: CacheConfig) -> Self {
        Self {
            cache: DirectoryCache::new(config),
            backend,
        }
    }

    pub fn with_backend(backend: B) -> Self {
        Self::new(backend, CacheConfig::default())
    }

    pub fn cache(&self) -> &DirectoryCache {
        &self.cache
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn set_current_page(&mut self, index: i64) {
        self.cache.set_current_page(index);
    }

    /// Resolve `key`, running fetches until the lookup settles.
    pub fn resolve(&mut self, key: &str) -> Result<Resolution> {
        self.cache.resolve(key);
        self.drain()?;
        Ok(self.cache.resolution(key))
    }

    /// Like [`Directory::resolve`], but turns a failed lookup into an error.
    pub fn require(&mut self, key: &str) -> Result<Composer> {
        let resolution = self.resolve(key)?;
        match (resolution.status, resolution.entity) {
            (LookupStatus::Resolved, Some(composer)) => Ok(composer),
            (
                LookupStatus::Failed {
                    failure: LookupFailure::FetchFailed { stream, reason },
                },
                _,
            ) => Err(DirError::FetchFailed { stream, reason }),
            _ => Err(DirError::KeyNotFound(key.to_string())),
        }
    }

    /// Restart a failed lookup and run it to completion.
    pub fn retry(&mut self, key: &str) -> Result<Resolution> {
        self.cache.retry(key);
        self.drain()?;
        Ok(self.cache.resolution(key))
    }

    /// Re-fetch the sheets of `key`, e.g. after one was saved.
    pub fn refresh_sheets(&mut self, key: &str) -> Result<Resolution> {
        self.cache.refresh_sub_collection(key);
        self.drain()?;
        Ok(self.cache.resolution(key))
    }

    /// Delete a composer through the backend and invalidate the whole cache.
    ///
    /// The backend's placeholder composer is refused before any request is made,
    /// whether or not it has been looked up yet.
    pub fn delete(&mut self, key: &str) -> Result<()> {
        let placeholder = key == safe_name(PLACEHOLDER_COMPOSER)
            || find_by_key(self.cache.store(), key).is_some_and(Composer::is_placeholder);
        if placeholder {
            return Err(DirError::ReadOnly(key.to_string()));
        }

        self.backend.delete_entity(key)?;
        info!(key, "composer deleted");
        self.cache.invalidate_all();
        Ok(())
    }

    pub fn invalidate_all(&mut self) {
        self.cache.invalidate_all();
    }

    fn drain(&mut self) -> Result<()> {
        loop {
            let pending = self.cache.take_pending();
            if pending.is_empty() {
                return Ok(());
            }
            for fetch in pending {
                let outcome = self.execute(&fetch.request);
                self.cache.complete(fetch.ticket, outcome)?;
            }
        }
    }

    fn execute(&self, request: &FetchRequest) -> std::result::Result<FetchPayload, String> {
        let result = match request {
            FetchRequest::Directory(req) => self
                .backend
                .fetch_directory_page(req)
                .map(FetchPayload::Directory),
            FetchRequest::SubCollection(req) => self
                .backend
                .fetch_sub_collection(req)
                .map(FetchPayload::SubCollection),
        };
        result.map_err(|err| {
            warn!(stream = %request.stream(), error = %err, "backend request failed");
            err.to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mem::MemBackend;
    use crate::store::fixtures::{composer, sheet};

    fn directory(names: &[&str], page_size: usize) -> Directory<MemBackend> {
        let backend = MemBackend::with_page_size(page_size);
        for (i, name) in names.iter().enumerate() {
            backend.add_composer(composer(i as u64 + 1, name));
        }
        Directory::with_backend(backend)
    }

    #[test]
    fn resolve_settles_in_one_call() {
        let mut dir = directory(&["Bach", "Chopin"], 10);
        dir.backend().add_sheet("chopin", sheet(1, "Nocturne", "Chopin"));

        let res = dir.resolve("chopin").unwrap();

        assert!(res.is_resolved());
        assert_eq!(res.entity.unwrap().sheets.sheets().len(), 1);
        assert_eq!(dir.backend().directory_pages_requested(), vec![1]);
        assert_eq!(dir.backend().sheet_requests(), vec!["chopin"]);
    }

    #[test]
    fn require_reports_missing_key_as_error() {
        let mut dir = directory(&["Bach"], 10);
        assert!(matches!(dir.require("mozart"), Err(DirError::KeyNotFound(k)) if k == "mozart"));
    }

    #[test]
    fn require_reports_backend_failure_with_its_stream() {
        let mut dir = directory(&["Bach"], 10);
        dir.backend().set_fail_directory(true);
        assert!(matches!(
            dir.require("bach"),
            Err(DirError::FetchFailed { stream, .. }) if stream == "directory"
        ));

        dir.backend().set_fail_directory(false);
        dir.backend().set_fail_sheets_for(Some("bach"));
        dir.retry("bach").unwrap();
        assert!(matches!(
            dir.require("bach"),
            Err(DirError::FetchFailed { stream, .. }) if stream == "sheets:bach"
        ));
    }

    #[test]
    fn retry_after_backend_recovers() {
        let mut dir = directory(&["Bach"], 10);
        dir.backend().set_fail_directory(true);
        assert!(!dir.resolve("bach").unwrap().is_resolved());

        dir.backend().set_fail_directory(false);
        assert!(dir.retry("bach").unwrap().is_resolved());
    }

    #[test]
    fn delete_invalidates_cache() {
        let mut dir = directory(&["Bach", "Chopin"], 10);
        assert!(dir.resolve("bach").unwrap().is_resolved());

        dir.delete("bach").unwrap();
        assert!(dir.cache().store().is_empty());

        let res = dir.resolve("bach").unwrap();
        assert_eq!(
            res.status,
            LookupStatus::Failed {
                failure: LookupFailure::KeyNotFound
            }
        );
    }

    #[test]
    fn placeholder_composer_cannot_be_deleted() {
        let mut dir = directory(&["Unknown"], 10);
        assert!(dir.resolve("unknown").unwrap().is_resolved());

        assert!(matches!(dir.delete("unknown"), Err(DirError::ReadOnly(_))));
        assert!(!dir.cache().store().is_empty());
    }

    #[test]
    fn placeholder_is_refused_before_any_lookup() {
        let mut dir = directory(&["Unknown", "Bach"], 10);

        assert!(matches!(dir.delete("unknown"), Err(DirError::ReadOnly(_))));
        assert!(dir.backend().requests().is_empty());
        assert!(dir.resolve("unknown").unwrap().is_resolved());
    }

    #[test]
    fn refresh_sheets_picks_up_new_rows() {
        let mut dir = directory(&["Bach"], 10);
        assert!(dir.resolve("bach").unwrap().is_resolved());

        dir.backend().add_sheet("bach", sheet(2, "Fugue", "Bach"));
        let res = dir.refresh_sheets("bach").unwrap();

        assert_eq!(res.entity.unwrap().sheets.sheets()[0].sheet_name, "Fugue");
        assert_eq!(dir.backend().sheet_requests(), vec!["bach", "bach"]);
    }
}
