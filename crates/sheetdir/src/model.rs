//! # Domain Model: Composers, Sheets and Pages
//!
//! The directory is a server-paginated list of [`Composer`] records. Each composer
//! owns a lazily loaded list of [`Sheet`]s that is fetched separately, one parent at
//! a time.
//!
//! ## Keys
//!
//! A composer is addressed by its `safe_name`, a stable key derived from the display
//! name with [`safe_name`]. The numeric `id` is carried along but never used for
//! lookup: routes and links only ever know the key.
//!
//! ## Sub-collection States
//!
//! [`SubCollection`] distinguishes "never fetched" from "fetched, nothing there":
//!
//! ```text
//! Unset ──(sheet fetch ok, 0 rows)──▶ Empty
//!   │
//!   └────(sheet fetch ok, n rows)───▶ Populated(sheets)
//! ```
//!
//! Only invalidation moves a sub-collection back to `Unset`.
//!
//! ## Pages
//!
//! A [`Page`] is what one backend call returns: the records, the page index the
//! server answered for, the sort order and the declared total page count. Pages are
//! stored whole; a later fetch of the same index replaces the earlier one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sort order the directory uses unless configured otherwise.
pub const DEFAULT_SORT: &str = "updated_at desc";

/// Display name of the catch-all composer the backend assigns to orphan sheets.
pub const PLACEHOLDER_COMPOSER: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sheet {
    pub id: u64,
    pub safe_sheet_name: String,
    pub sheet_name: String,
    /// Display name of the owning composer.
    pub composer: String,
    #[serde(default)]
    pub release_date: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Lazily loaded child records of a composer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubCollection {
    #[default]
    Unset,
    Empty,
    Populated(Vec<Sheet>),
}

impl SubCollection {
    /// Build the post-fetch state from a list of rows.
    pub fn from_rows(rows: Vec<Sheet>) -> Self {
        if rows.is_empty() {
            SubCollection::Empty
        } else {
            SubCollection::Populated(rows)
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, SubCollection::Unset)
    }

    /// Sheets known so far. Empty for both `Unset` and `Empty`.
    pub fn sheets(&self) -> &[Sheet] {
        match self {
            SubCollection::Populated(rows) => rows,
            SubCollection::Unset | SubCollection::Empty => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Composer {
    pub id: u64,
    pub name: String,
    pub safe_name: String,
    #[serde(default)]
    pub portrait_url: String,
    #[serde(default)]
    pub epoch: String,
    #[serde(skip)]
    pub sheets: SubCollection,
}

impl Composer {
    /// Create a composer whose key is derived from `name`.
    pub fn new(id: u64, name: impl Into<String>, epoch: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            safe_name: safe_name(&name),
            name,
            portrait_url: String::new(),
            epoch: epoch.into(),
            sheets: SubCollection::Unset,
        }
    }

    /// The backend's catch-all composer cannot be edited or deleted.
    pub fn is_placeholder(&self) -> bool {
        self.name == PLACEHOLDER_COMPOSER
    }
}

/// One server page of records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub index: u32,
    pub sort_by: String,
    pub total_pages: u32,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(index: u32, total_pages: u32, items: Vec<T>) -> Self {
        Self {
            index,
            sort_by: DEFAULT_SORT.to_string(),
            total_pages,
            items,
        }
    }

    pub fn with_sort(mut self, sort_by: impl Into<String>) -> Self {
        self.sort_by = sort_by.into();
        self
    }
}

/// Request for one directory page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    pub page: u32,
    #[serde(rename = "sortBy")]
    pub sort_by: String,
}

/// Request for the sheets of exactly one composer. Always page 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubCollectionRequest {
    pub page: u32,
    #[serde(rename = "sortBy")]
    pub sort_by: String,
    #[serde(rename = "composer")]
    pub parent_key: String,
}

impl SubCollectionRequest {
    pub fn for_parent(parent_key: impl Into<String>, sort_by: impl Into<String>) -> Self {
        Self {
            page: 1,
            sort_by: sort_by.into(),
            parent_key: parent_key.into(),
        }
    }
}

/// Derive the stable lookup key from a display name.
///
/// Lowercases, keeps alphanumerics, and collapses every other run of characters
/// into a single `-`. Leading and trailing separators are dropped.
pub fn safe_name(display_name: &str) -> String {
    let mut out = String::with_capacity(display_name.len());
    let mut pending_sep = false;
    for c in display_name.chars() {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('-');
            }
            pending_sep = false;
            out.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}
