use crate::model::{Composer, Page, Sheet, SubCollection};
use std::collections::BTreeMap;
use tracing::debug;

/// A cached directory page together with the order in which it was fetched.
#[derive(Debug, Clone)]
pub struct StoredPage {
    pub page: Page<Composer>,
    pub seq: u64,
}

#[derive(Debug, Default)]
pub struct PageStore {
    pages: BTreeMap<u32, StoredPage>,
    current_page_index: Option<i64>,
    total_page_count: Option<u32>,
    next_seq: u64,
}

impl PageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the page at `page.index` and adopt its declared page count.
    ///
    /// Pages beyond the new count are dropped, and the current pointer is reset
    /// to 1 if it no longer falls inside `1..=total`. An empty directory (a count
    /// of 0) keeps no pages and no pointer.
    pub fn upsert_page(&mut self, page: Page<Composer>) {
        let total = page.total_pages;
        let index = page.index;
        self.next_seq += 1;
        self.pages.insert(
            index,
            StoredPage {
                page,
                seq: self.next_seq,
            },
        );
        self.total_page_count = Some(total);

        let stale: Vec<u32> = self
            .pages
            .range(total.saturating_add(1)..)
            .map(|(i, _)| *i)
            .collect();
        for i in stale {
            self.pages.remove(&i);
            debug!(page = i, total, "dropped page beyond declared page count");
        }

        if total == 0 {
            if self.current_page_index.is_some() {
                debug!(pointer = ?self.current_page_index, "directory is empty, pointer cleared");
            }
            self.current_page_index = None;
            return;
        }

        let in_range = matches!(
            self.current_page_index,
            Some(i) if (1..=i64::from(total)).contains(&i)
        );
        if !in_range {
            debug!(
                pointer = ?self.current_page_index,
                total,
                "current page pointer out of range, reset to 1"
            );
            self.current_page_index = Some(1);
        }
    }

    pub fn page(&self, index: u32) -> Option<&Page<Composer>> {
        self.pages.get(&index).map(|stored| &stored.page)
    }

    pub fn contains_page(&self, index: u32) -> bool {
        self.pages.contains_key(&index)
    }

    /// All cached pages in page-index order.
    pub fn pages(&self) -> impl Iterator<Item = &StoredPage> {
        self.pages.values()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn current_page_index(&self) -> Option<i64> {
        self.current_page_index
    }

    /// Store the pointer as given. Out-of-range values are corrected when the
    /// next directory request is made.
    pub fn set_current_page_index(&mut self, index: i64) {
        self.current_page_index = Some(index);
    }

    /// Declared page count, `None` until a page has been stored.
    pub fn total_page_count(&self) -> Option<u32> {
        self.total_page_count
    }

    /// Page indexes in `1..=total` that are not cached yet.
    ///
    /// Empty while the total is unknown.
    pub fn missing_pages(&self) -> Vec<u32> {
        match self.total_page_count {
            Some(total) => (1..=total).filter(|i| !self.pages.contains_key(i)).collect(),
            None => Vec::new(),
        }
    }

    /// Set the sheets of every cached copy of `key`.
    ///
    /// Returns false when no cached page contains the composer, in which case the
    /// rows are discarded.
    pub fn attach_sub_collection(&mut self, key: &str, rows: Vec<Sheet>) -> bool {
        let sheets = SubCollection::from_rows(rows);
        self.update_composer(key, |composer| composer.sheets = sheets.clone())
    }

    /// Forget the sheets of `key` so the next lookup fetches them again.
    pub fn reset_sub_collection(&mut self, key: &str) -> bool {
        self.update_composer(key, |composer| composer.sheets = SubCollection::Unset)
    }

    /// Drop every page, the page count and the pointer.
    pub fn clear(&mut self) {
        self.pages.clear();
        self.total_page_count = None;
        self.current_page_index = None;
    }

    fn update_composer(&mut self, key: &str, mut apply: impl FnMut(&mut Composer)) -> bool {
        let mut found = false;
        for stored in self.pages.values_mut() {
            for composer in stored.page.items.iter_mut().filter(|c| c.safe_name == key) {
                apply(composer);
                found = true;
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::{composer, directory_page, sheet};

    #[test]
    fn upsert_sets_total_and_stores_page() {
        let mut store = PageStore::new();
        assert_eq!(store.total_page_count(), None);

        store.upsert_page(directory_page(1, 3, &["Bach", "Brahms"]));

        assert_eq!(store.total_page_count(), Some(3));
        assert_eq!(store.page(1).unwrap().items.len(), 2);
        assert!(store.page(2).is_none());
    }

    #[test]
    fn upsert_replaces_whole_page() {
        let mut store = PageStore::new();
        store.upsert_page(directory_page(1, 1, &["Bach", "Brahms"]));
        store.upsert_page(directory_page(1, 1, &["Chopin"]));

        let page = store.page(1).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].safe_name, "chopin");
    }

    #[test]
    fn upsert_increments_fetch_sequence() {
        let mut store = PageStore::new();
        store.upsert_page(directory_page(1, 2, &["Bach"]));
        store.upsert_page(directory_page(2, 2, &["Chopin"]));

        let seqs: Vec<u64> = store.pages().map(|p| p.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[test]
    fn shrinking_total_drops_pages_beyond_it() {
        let mut store = PageStore::new();
        store.upsert_page(directory_page(3, 3, &["Liszt"]));
        store.upsert_page(directory_page(1, 2, &["Bach"]));

        assert!(!store.contains_page(3));
        assert_eq!(store.page_count(), 1);
    }

    #[test]
    fn out_of_range_pointer_is_reset_on_upsert() {
        let mut store = PageStore::new();
        store.set_current_page_index(5);
        store.upsert_page(directory_page(1, 2, &["Bach"]));
        assert_eq!(store.current_page_index(), Some(1));
    }

    #[test]
    fn empty_directory_keeps_no_pages_and_no_pointer() {
        let mut store = PageStore::new();
        store.set_current_page_index(3);
        store.upsert_page(Page::new(1, 0, vec![]));

        assert_eq!(store.total_page_count(), Some(0));
        assert!(store.is_empty());
        assert_eq!(store.current_page_index(), None);
        assert!(store.missing_pages().is_empty());
    }

    #[test]
    fn in_range_pointer_survives_upsert() {
        let mut store = PageStore::new();
        store.set_current_page_index(2);
        store.upsert_page(directory_page(1, 2, &["Bach"]));
        assert_eq!(store.current_page_index(), Some(2));
    }

    #[test]
    fn missing_pages_lists_uncached_indexes() {
        let mut store = PageStore::new();
        assert!(store.missing_pages().is_empty());

        store.upsert_page(directory_page(2, 4, &["Bach"]));
        assert_eq!(store.missing_pages(), vec![1, 3, 4]);
    }

    #[test]
    fn attach_sub_collection_updates_every_copy() {
        let mut store = PageStore::new();
        store.upsert_page(directory_page(1, 2, &["Bach"]));
        store.upsert_page(directory_page(2, 2, &["Bach", "Chopin"]));

        assert!(store.attach_sub_collection(
            "bach",
            vec![sheet(1, "Goldberg Variations", "Bach")]
        ));

        for stored in store.pages() {
            let bach = stored
                .page
                .items
                .iter()
                .find(|c| c.safe_name == "bach")
                .unwrap();
            assert_eq!(bach.sheets.sheets().len(), 1);
        }
        let chopin = &store.page(2).unwrap().items[1];
        assert!(chopin.sheets.is_unset());
    }

    #[test]
    fn attach_sub_collection_with_no_rows_marks_empty() {
        let mut store = PageStore::new();
        store.upsert_page(directory_page(1, 1, &["Bach"]));
        store.attach_sub_collection("bach", vec![]);
        assert_eq!(store.page(1).unwrap().items[0].sheets, SubCollection::Empty);
    }

    #[test]
    fn attach_sub_collection_for_unknown_key_is_inert() {
        let mut store = PageStore::new();
        store.upsert_page(directory_page(1, 1, &["Bach"]));
        assert!(!store.attach_sub_collection("mozart", vec![sheet(1, "Requiem", "Mozart")]));
        assert!(store.page(1).unwrap().items[0].sheets.is_unset());
    }

    #[test]
    fn reset_sub_collection_returns_to_unset() {
        let mut store = PageStore::new();
        store.upsert_page(directory_page(1, 1, &["Bach"]));
        store.attach_sub_collection("bach", vec![]);
        assert!(store.reset_sub_collection("bach"));
        assert!(store.page(1).unwrap().items[0].sheets.is_unset());
    }

    #[test]
    fn clear_forgets_everything() {
        let mut store = PageStore::new();
        store.set_current_page_index(2);
        store.upsert_page(directory_page(1, 2, &["Bach"]));
        store.clear();

        assert!(store.is_empty());
        assert_eq!(store.total_page_count(), None);
        assert_eq!(store.current_page_index(), None);
    }

    #[test]
    fn composer_fixture_derives_key() {
        assert_eq!(composer(7, "Clara Schumann").safe_name, "clara-schumann");
    }
}
