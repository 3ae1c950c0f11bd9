//! Builders for composers, sheets and pages used across the test suites.

use crate::model::{Composer, Page, Sheet, PLACEHOLDER_COMPOSER};
use chrono::{DateTime, Utc};

pub fn composer(id: u64, name: &str) -> Composer {
    let epoch = if name == PLACEHOLDER_COMPOSER {
        ""
    } else {
        "Baroque"
    };
    Composer::new(id, name, epoch)
}

/// A directory page holding one composer per name, ids derived from the page index.
pub fn directory_page(index: u32, total: u32, names: &[&str]) -> Page<Composer> {
    let items = names
        .iter()
        .enumerate()
        .map(|(i, name)| composer(u64::from(index) * 100 + i as u64, name))
        .collect();
    Page::new(index, total, items)
}

pub fn sheet(id: u64, title: &str, composer_name: &str) -> Sheet {
    Sheet {
        id,
        safe_sheet_name: crate::model::safe_name(title),
        sheet_name: title.to_string(),
        composer: composer_name.to_string(),
        release_date: None,
        updated_at: DateTime::<Utc>::from_timestamp(1_700_000_000 + id as i64, 0)
            .unwrap_or_default(),
    }
}
