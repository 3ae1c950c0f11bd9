//! # Directory Index: Key → Composer
//!
//! Routes address composers by `safe_name`, but the cache only holds pages. The
//! index answers "do we already have this composer?" from whatever pages happen to
//! be cached, without triggering I/O.
//!
//! ## Rules
//!
//! - **All pages are searched.** Pages arrive independently and out of order, so
//!   the composer may live on any cached page, not just the current one.
//! - **Most recent copy wins.** The directory is sorted by `updated_at`, so a
//!   composer can appear on two cached pages fetched at different times. The copy
//!   from the page with the highest fetch sequence is returned.
//! - **Pure.** The result depends only on the store's contents.
//!
//! Use [`find_by_key`] for one-off checks (a linear scan, which is what the
//! lookup loop does after each fetch). Build a [`DirectoryIndex`] when answering
//! many queries against the same snapshot.

use crate::model::Composer;
use crate::store::PageStore;
use std::collections::HashMap;

/// Find the most recently fetched copy of `key` across all cached pages.
pub fn find_by_key<'a>(store: &'a PageStore, key: &str) -> Option<&'a Composer> {
    store
        .pages()
        .filter_map(|stored| {
            stored
                .page
                .items
                .iter()
                .find(|c| c.safe_name == key)
                .map(|c| (stored.seq, c))
        })
        .max_by_key(|(seq, _)| *seq)
        .map(|(_, composer)| composer)
}

/// A key → composer map built from one snapshot of the store.
#[derive(Debug)]
pub struct DirectoryIndex<'a> {
    entries: HashMap<&'a str, (u64, &'a Composer)>,
}

impl<'a> DirectoryIndex<'a> {
    pub fn build(store: &'a PageStore) -> Self {
        let mut entries: HashMap<&'a str, (u64, &'a Composer)> = HashMap::new();
        for stored in store.pages() {
            for composer in &stored.page.items {
                let slot = entries
                    .entry(composer.safe_name.as_str())
                    .or_insert((stored.seq, composer));
                if stored.seq > slot.0 {
                    *slot = (stored.seq, composer);
                }
            }
        }
        Self { entries }
    }

    pub fn find_by_key(&self, key: &str) -> Option<&'a Composer> {
        self.entries.get(key).map(|(_, composer)| *composer)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Known composers, sorted by key.
    pub fn composers(&self) -> Vec<&'a Composer> {
        let mut all: Vec<&'a Composer> = self.entries.values().map(|(_, c)| *c).collect();
        all.sort_by(|a, b| a.safe_name.cmp(&b.safe_name));
        all
    }
}
