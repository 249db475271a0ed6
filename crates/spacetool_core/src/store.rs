use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use thiserror::Error;

use crate::space_key::SpaceKey;

/// Store-assigned page identifier. Opaque to this crate.
pub type PageId = String;

/// Label of the link returned for an uploaded attachment.
pub const DOWNLOAD_LINK_LABEL: &str = "Download original file";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemotePage {
    pub id: PageId,
    pub title: String,
    pub body: String,
    /// Parent ids from the space root down to the immediate parent.
    pub ancestors: Vec<PageId>,
}

impl RemotePage {
    pub fn depth(&self) -> usize {
        self.ancestors.len()
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.ancestors.last().map(String::as_str)
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default)]
pub struct SearchBatch {
    pub pages: Vec<RemotePage>,
    pub is_last: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPage {
    pub title: String,
    pub body: String,
    pub parent_id: Option<PageId>,
}

/// Failures that must stop the whole run instead of skipping one unit of work.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("content store rejected the credentials (HTTP 401); check STORE_USER and STORE_API_TOKEN")]
    Unauthorized,
    #[error("content store denied access (HTTP 403) for {0}")]
    Forbidden(String),
}

/// True when `error` carries a [`StoreError`] anywhere in its chain.
pub fn is_fatal(error: &anyhow::Error) -> bool {
    error
        .chain()
        .any(|cause| cause.downcast_ref::<StoreError>().is_some())
}

/// Operations consumed from the remote content store.
pub trait ContentStore {
    fn space_exists(&mut self, key: &SpaceKey) -> Result<bool>;
    fn create_space(&mut self, key: &SpaceKey, display_name: &str) -> Result<()>;
    /// `cursor` is the zero-based offset of the first result.
    fn search_pages(
        &mut self,
        space: &SpaceKey,
        page_size: usize,
        cursor: usize,
    ) -> Result<SearchBatch>;
    fn create_page(&mut self, space: &SpaceKey, page: &NewPage) -> Result<PageId>;
    fn homepage_id(&mut self, space: &SpaceKey) -> Result<Option<PageId>>;
    /// Exact title match first, then a fuzzy title search.
    fn find_page_by_title(&mut self, space: &SpaceKey, title: &str) -> Result<Option<PageId>>;
    /// Returns the markup fragment linking to the uploaded file.
    fn upload_attachment(&mut self, page_id: &str, file_path: &Path) -> Result<String>;
    fn request_count(&self) -> usize;
}
