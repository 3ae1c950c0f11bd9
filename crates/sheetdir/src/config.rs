//! # Configuration
//!
//! Cache behavior is configured through [`confique`], which handles layered loading
//! from TOML files and environment variables.
//!
//! ## Resolution Order
//!
//! Highest priority first:
//! 1. **Environment variables**: `SHEETDIR_SORT_BY`, `SHEETDIR_MAX_DIRECTORY_FETCHES`, ...
//! 2. **Explicit file**: the path handed to [`CacheConfig::load`].
//! 3. **User config**: `sheetdir.toml` in the OS config directory (via `directories`).
//! 4. **Compiled defaults**: `#[config(default = ...)]`.
//!
//! ## Available Settings
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `sort_by` | `updated_at desc` | Sort order sent with directory page requests |
//! | `sub_collection_sort_by` | `updated_at desc` | Sort order sent with sheet requests |
//! | `max_directory_fetches` | `10` | Directory fetches one lookup may issue before giving up |

use crate::error::Result;
use crate::model::DEFAULT_SORT;
use confique::Config;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "sheetdir.toml";

const DEFAULT_MAX_DIRECTORY_FETCHES: u32 = 10;

#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Sort order sent with directory page requests.
    #[config(default = "updated_at desc", env = "SHEETDIR_SORT_BY")]
    pub sort_by: String,

    /// Sort order sent with a composer's sheet request.
    #[config(default = "updated_at desc", env = "SHEETDIR_SUB_COLLECTION_SORT_BY")]
    pub sub_collection_sort_by: String,

    /// How many directory pages a single lookup may fetch before the key is
    /// reported as not found.
    #[config(default = 10, env = "SHEETDIR_MAX_DIRECTORY_FETCHES")]
    pub max_directory_fetches: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sort_by: DEFAULT_SORT.to_string(),
            sub_collection_sort_by: DEFAULT_SORT.to_string(),
            max_directory_fetches: DEFAULT_MAX_DIRECTORY_FETCHES,
        }
    }
}

impl CacheConfig {
    /// Load the layered configuration. Missing files are skipped.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = Self::builder().env();
        if let Some(path) = file {
            builder = builder.file(path);
        }
        if let Some(path) = user_config_path() {
            builder = builder.file(path);
        }
        Ok(builder.load()?)
    }

    /// A commented TOML file listing every setting with its default.
    pub fn template() -> String {
        confique::toml::template::<Self>(confique::toml::FormatOptions::default())
    }

    pub fn with_max_directory_fetches(mut self, max: u32) -> Self {
        self.max_directory_fetches = max;
        self
    }
}

/// Location of the per-user config file, if the platform has a config directory.
pub fn user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "sheetable", "sheetdir")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}
