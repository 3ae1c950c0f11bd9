//! JSON bodies exchanged with the backend.
//!
//! Page responses look like:
//!
//! ```json
//! { "data": [ ... ], "page": 1, "page_max": 4, "sort_by": "updated_at desc" }
//! ```
//!
//! Older endpoints name the row array after the collection (`composers`,
//! `sheets`); both spellings are accepted. Requests are sent as the JSON form of
//! [`PageRequest`] / [`SubCollectionRequest`].
//!
//! [`PageRequest`]: crate::model::PageRequest
//! [`SubCollectionRequest`]: crate::model::SubCollectionRequest

use crate::error::Result;
use crate::fetch::{FetchPayload, FetchRequest};
use crate::model::{Composer, Page, Sheet, DEFAULT_SORT};
use serde::de::DeserializeOwned;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct PageBody<T> {
    #[serde(alias = "composers", alias = "sheets")]
    data: Vec<T>,
    page: u32,
    page_max: u32,
    #[serde(default)]
    sort_by: Option<String>,
}

fn decode_page<T: DeserializeOwned>(body: &str) -> Result<Page<T>> {
    let body: PageBody<T> = serde_json::from_str(body)?;
    Ok(Page {
        index: body.page,
        sort_by: body.sort_by.unwrap_or_else(|| DEFAULT_SORT.to_string()),
        total_pages: body.page_max,
        items: body.data,
    })
}

pub fn decode_directory_page(body: &str) -> Result<Page<Composer>> {
    decode_page(body)
}

pub fn decode_sheet_page(body: &str) -> Result<Page<Sheet>> {
    decode_page(body)
}

/// Decode a response body into the payload matching `request`.
pub fn decode_response(request: &FetchRequest, body: &str) -> Result<FetchPayload> {
    Ok(match request {
        FetchRequest::Directory(_) => FetchPayload::Directory(decode_directory_page(body)?),
        FetchRequest::SubCollection(_) => FetchPayload::SubCollection(decode_sheet_page(body)?),
    })
}

/// JSON request body for a fetch.
pub fn encode_request(request: &FetchRequest) -> Result<String> {
    Ok(match request {
        FetchRequest::Directory(req) => serde_json::to_string(req)?,
        FetchRequest::SubCollection(req) => serde_json::to_string(req)?,
    })
}
