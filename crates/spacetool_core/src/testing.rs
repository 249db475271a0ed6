//! In-memory content store shared by the replicate, ingest and orchestrate tests.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

use crate::markup::link_paragraph;
use crate::space_key::SpaceKey;
use crate::store::{ContentStore, NewPage, PageId, RemotePage, SearchBatch, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPage {
    pub space: SpaceKey,
    pub id: PageId,
    pub title: String,
    pub body: String,
    pub parent_id: Option<PageId>,
}

#[derive(Default)]
pub struct FakeStore {
    pub spaces: BTreeMap<SpaceKey, String>,
    pub homepages: BTreeMap<SpaceKey, PageId>,
    pub source_pages: BTreeMap<SpaceKey, Vec<RemotePage>>,
    pub created: Vec<CreatedPage>,
    pub created_spaces: Vec<SpaceKey>,
    pub uploads: Vec<(PageId, PathBuf)>,
    pub search_cursors: Vec<usize>,
    pub fail_create_titles: BTreeSet<String>,
    pub fail_create_space: bool,
    pub fail_search: bool,
    pub fail_space_lookup: bool,
    pub fail_uploads: bool,
    pub unauthorized: bool,
    pub forbid_writes: bool,
    next_id: u64,
    request_count: usize,
}

impl FakeStore {
    pub fn with_source(space: &str, pages: Vec<RemotePage>) -> Self {
        let mut store = Self::default();
        let key = SpaceKey::new(space);
        store.spaces.insert(key.clone(), space.to_string());
        store.source_pages.insert(key, pages);
        store
    }

    pub fn add_space_with_homepage(&mut self, space: &SpaceKey, homepage_id: &str) {
        self.spaces.insert(space.clone(), space.to_string());
        self.homepages.insert(space.clone(), homepage_id.to_string());
    }

    pub fn created_in(&self, space: &SpaceKey) -> Vec<&CreatedPage> {
        self.created
            .iter()
            .filter(|page| &page.space == space)
            .collect()
    }

    fn page_exists(&self, space: &SpaceKey, id: &str) -> bool {
        self.homepages.get(space).is_some_and(|home| home == id)
            || self
                .created
                .iter()
                .any(|page| &page.space == space && page.id == id)
            || self
                .source_pages
                .get(space)
                .is_some_and(|pages| pages.iter().any(|page| page.id == id))
    }

    fn titles_in(&self, space: &SpaceKey) -> Vec<(String, PageId)> {
        let mut titles: Vec<(String, PageId)> = self
            .created
            .iter()
            .filter(|page| &page.space == space)
            .map(|page| (page.title.clone(), page.id.clone()))
            .collect();
        if let Some(pages) = self.source_pages.get(space) {
            titles.extend(pages.iter().map(|page| (page.title.clone(), page.id.clone())));
        }
        titles
    }

    fn check_auth(&self) -> Result<()> {
        if self.unauthorized {
            return Err(StoreError::Unauthorized.into());
        }
        Ok(())
    }
}

pub fn page(id: &str, title: &str, ancestors: &[&str]) -> RemotePage {
    RemotePage {
        id: id.to_string(),
        title: title.to_string(),
        body: format!("<p>{title} body</p>"),
        ancestors: ancestors.iter().map(|item| (*item).to_string()).collect(),
    }
}

impl ContentStore for FakeStore {
    fn space_exists(&mut self, key: &SpaceKey) -> Result<bool> {
        self.request_count += 1;
        self.check_auth()?;
        if self.fail_space_lookup {
            bail!("space lookup timed out");
        }
        Ok(self.spaces.contains_key(key))
    }

    fn create_space(&mut self, key: &SpaceKey, display_name: &str) -> Result<()> {
        self.request_count += 1;
        self.check_auth()?;
        if self.fail_create_space {
            bail!("space creation rejected: HTTP 400");
        }
        self.spaces.insert(key.clone(), display_name.to_string());
        self.created_spaces.push(key.clone());
        Ok(())
    }

    fn search_pages(
        &mut self,
        space: &SpaceKey,
        page_size: usize,
        cursor: usize,
    ) -> Result<SearchBatch> {
        self.request_count += 1;
        self.check_auth()?;
        if self.fail_search {
            bail!("search failed: HTTP 500");
        }
        self.search_cursors.push(cursor);
        let all = self.source_pages.get(space).cloned().unwrap_or_default();
        let pages: Vec<RemotePage> = all.into_iter().skip(cursor).take(page_size).collect();
        let is_last = pages.len() < page_size;
        Ok(SearchBatch { pages, is_last })
    }

    fn create_page(&mut self, space: &SpaceKey, page: &NewPage) -> Result<PageId> {
        self.request_count += 1;
        self.check_auth()?;
        if self.forbid_writes {
            return Err(StoreError::Forbidden(format!("cannot add pages to {space}")).into());
        }
        if self.fail_create_titles.contains(&page.title) {
            bail!("page creation rejected for {}", page.title);
        }
        if let Some(parent) = &page.parent_id
            && !self.page_exists(space, parent)
        {
            bail!("parent page {parent} does not exist in {space}");
        }
        self.next_id += 1;
        let id = format!("new-{}", self.next_id);
        self.created.push(CreatedPage {
            space: space.clone(),
            id: id.clone(),
            title: page.title.clone(),
            body: page.body.clone(),
            parent_id: page.parent_id.clone(),
        });
        Ok(id)
    }

    fn homepage_id(&mut self, space: &SpaceKey) -> Result<Option<PageId>> {
        self.request_count += 1;
        self.check_auth()?;
        Ok(self.homepages.get(space).cloned())
    }

    fn find_page_by_title(&mut self, space: &SpaceKey, title: &str) -> Result<Option<PageId>> {
        self.request_count += 1;
        self.check_auth()?;
        let titles = self.titles_in(space);
        if let Some((_, id)) = titles.iter().find(|(candidate, _)| candidate == title) {
            return Ok(Some(id.clone()));
        }
        let wanted = title.to_lowercase();
        Ok(titles
            .into_iter()
            .find(|(candidate, _)| candidate.to_lowercase().contains(&wanted))
            .map(|(_, id)| id))
    }

    fn upload_attachment(&mut self, page_id: &str, file_path: &Path) -> Result<String> {
        self.request_count += 1;
        self.check_auth()?;
        if self.fail_uploads {
            bail!("attachment upload failed: HTTP 413");
        }
        self.uploads.push((page_id.to_string(), file_path.to_path_buf()));
        let file_name = file_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(link_paragraph(
            &format!("/download/attachments/{page_id}/{file_name}"),
            crate::store::DOWNLOAD_LINK_LABEL,
        ))
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}
