use super::DirectoryBackend;
use crate::error::{DirError, Result};
use crate::fetch::FetchRequest;
use crate::model::{Composer, Page, PageRequest, Sheet, SubCollectionRequest};
use std::cell::RefCell;
use std::collections::HashMap;

const DEFAULT_PAGE_SIZE: usize = 10;

/// In-memory backend for testing.
///
/// Composers are served in insertion order, which stands in for the server's
/// `updated_at desc` ordering. Uses `RefCell` for interior mutability since the
/// cache is single-threaded; this lets the [`DirectoryBackend`] trait use `&self`.
pub struct MemBackend {
    composers: RefCell<Vec<Composer>>,
    sheets: RefCell<HashMap<String, Vec<Sheet>>>,
    page_size: usize,
    requests: RefCell<Vec<FetchRequest>>,
    fail_directory: RefCell<bool>,
    fail_sheets_for: RefCell<Option<String>>,
}

impl Default for MemBackend {
    fn default() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            composers: RefCell::new(Vec::new()),
            sheets: RefCell::new(HashMap::new()),
            page_size: page_size.max(1),
            requests: RefCell::new(Vec::new()),
            fail_directory: RefCell::new(false),
            fail_sheets_for: RefCell::new(None),
        }
    }

    pub fn add_composer(&self, composer: Composer) {
        self.composers.borrow_mut().push(composer);
    }

    pub fn add_sheet(&self, parent_key: &str, sheet: Sheet) {
        self.sheets
            .borrow_mut()
            .entry(parent_key.to_string())
            .or_default()
            .push(sheet);
    }

    /// Make every directory fetch fail until switched off.
    pub fn set_fail_directory(&self, fail: bool) {
        *self.fail_directory.borrow_mut() = fail;
    }

    /// Make sheet fetches for one composer fail.
    pub fn set_fail_sheets_for(&self, key: Option<&str>) {
        *self.fail_sheets_for.borrow_mut() = key.map(str::to_string);
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.borrow().clone()
    }

    /// Page indexes of the directory requests received, in order.
    pub fn directory_pages_requested(&self) -> Vec<u32> {
        self.requests
            .borrow()
            .iter()
            .filter_map(|req| match req {
                FetchRequest::Directory(req) => Some(req.page),
                FetchRequest::SubCollection(_) => None,
            })
            .collect()
    }

    /// Parent keys of the sheet requests received, in order.
    pub fn sheet_requests(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .filter_map(|req| match req {
                FetchRequest::SubCollection(req) => Some(req.parent_key.clone()),
                FetchRequest::Directory(_) => None,
            })
            .collect()
    }

    pub fn clear_requests(&self) {
        self.requests.borrow_mut().clear();
    }

    fn total_pages(&self) -> u32 {
        let count = self.composers.borrow().len();
        count.div_ceil(self.page_size).max(1) as u32
    }
}

impl DirectoryBackend for MemBackend {
    fn fetch_directory_page(&self, request: &PageRequest) -> Result<Page<Composer>> {
        self.requests
            .borrow_mut()
            .push(FetchRequest::Directory(request.clone()));
        if *self.fail_directory.borrow() {
            return Err(DirError::Backend("Simulated directory failure".to_string()));
        }

        let composers = self.composers.borrow();
        let start = (request.page.max(1) as usize - 1) * self.page_size;
        let items: Vec<Composer> = composers
            .iter()
            .skip(start)
            .take(self.page_size)
            .cloned()
            .collect();
        Ok(Page::new(request.page, self.total_pages(), items).with_sort(request.sort_by.clone()))
    }

    fn fetch_sub_collection(&self, request: &SubCollectionRequest) -> Result<Page<Sheet>> {
        self.requests
            .borrow_mut()
            .push(FetchRequest::SubCollection(request.clone()));
        if self.fail_sheets_for.borrow().as_deref() == Some(request.parent_key.as_str()) {
            return Err(DirError::Backend(format!(
                "Simulated sheet failure for {}",
                request.parent_key
            )));
        }

        let rows = self
            .sheets
            .borrow()
            .get(&request.parent_key)
            .cloned()
            .unwrap_or_default();
        Ok(Page::new(1, 1, rows).with_sort(request.sort_by.clone()))
    }

    fn delete_entity(&self, key: &str) -> Result<()> {
        let mut composers = self.composers.borrow_mut();
        let before = composers.len();
        composers.retain(|c| c.safe_name != key);
        if composers.len() == before {
            return Err(DirError::KeyNotFound(key.to_string()));
        }
        self.sheets.borrow_mut().remove(key);
        Ok(())
    }
}
