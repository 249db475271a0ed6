//! Copy every page of one space into another while keeping the page tree.
//!
//! Pages are created shallowest first, so a parent always exists in the
//! target before any of its children. Source ids are translated to target
//! ids through an [`IdMapping`] that only learns an entry once the target
//! page was created. Running the copy twice into the same space creates
//! every page twice; nothing here deduplicates across runs.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::space_key::SpaceKey;
use crate::store::{ContentStore, NewPage, PageId, RemotePage, is_fatal};

#[derive(Debug, Clone)]
pub struct ReplicationOptions {
    pub page_size: usize,
    pub excluded_titles: BTreeSet<String>,
}

impl Default for ReplicationOptions {
    fn default() -> Self {
        Self {
            page_size: crate::config::DEFAULT_PAGE_SIZE,
            excluded_titles: BTreeSet::new(),
        }
    }
}

/// Source page id -> target page id, filled as target pages are created.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct IdMapping(BTreeMap<PageId, PageId>);

impl IdMapping {
    pub fn record(&mut self, source_id: &str, target_id: &str) {
        self.0.insert(source_id.to_string(), target_id.to_string());
    }

    pub fn translate(&self, source_id: &str) -> Option<&str> {
        self.0.get(source_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageFailure {
    pub source_id: PageId,
    pub title: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplicationReport {
    pub source: SpaceKey,
    pub target: SpaceKey,
    pub discovered: usize,
    pub copied: usize,
    /// Pages whose parent was not copied and that were placed at the space root.
    pub reparented_to_root: Vec<String>,
    pub failures: Vec<PageFailure>,
    pub id_mapping: IdMapping,
}

/// Page through the source space and keep every page not excluded by title.
pub fn discover_pages<S: ContentStore>(
    store: &mut S,
    source: &SpaceKey,
    page_size: usize,
    excluded_titles: &BTreeSet<String>,
) -> Result<Vec<RemotePage>> {
    let page_size = page_size.max(1);
    let mut cursor = 0usize;
    let mut pages = Vec::new();
    loop {
        let batch = store
            .search_pages(source, page_size, cursor)
            .with_context(|| format!("failed to list pages of space {source} at offset {cursor}"))?;
        let fetched = batch.pages.len();
        for page in batch.pages {
            if excluded_titles.contains(&page.title) {
                debug!(space = %source, title = %page.title, "skipping excluded page");
                continue;
            }
            pages.push(page);
        }
        if batch.is_last || fetched == 0 {
            break;
        }
        cursor += fetched;
    }
    Ok(pages)
}

/// Stable sort by ancestor-chain length; pages at equal depth keep their
/// discovery order.
pub fn order_by_depth(pages: &mut [RemotePage]) {
    pages.sort_by_key(RemotePage::depth);
}

pub fn replicate<S: ContentStore>(
    store: &mut S,
    source: &SpaceKey,
    target: &SpaceKey,
    options: &ReplicationOptions,
) -> Result<ReplicationReport> {
    let mut pages = discover_pages(store, source, options.page_size, &options.excluded_titles)?;
    order_by_depth(&mut pages);
    info!(source = %source, space = %target, pages = pages.len(), "starting space copy");

    let mut report = ReplicationReport {
        source: source.clone(),
        target: target.clone(),
        discovered: pages.len(),
        copied: 0,
        reparented_to_root: Vec::new(),
        failures: Vec::new(),
        id_mapping: IdMapping::default(),
    };

    for page in &pages {
        let parent_id = match page.parent_id() {
            Some(source_parent) => match report.id_mapping.translate(source_parent) {
                Some(mapped) => Some(mapped.to_string()),
                None => {
                    warn!(
                        space = %target,
                        title = %page.title,
                        source_parent,
                        "parent was not copied, creating page at space root"
                    );
                    report.reparented_to_root.push(page.title.clone());
                    None
                }
            },
            None => None,
        };

        let request = NewPage {
            title: page.title.clone(),
            body: page.body.clone(),
            parent_id,
        };
        match store.create_page(target, &request) {
            Ok(new_id) => {
                report.id_mapping.record(&page.id, &new_id);
                report.copied += 1;
                info!(space = %target, title = %page.title, id = %new_id, "copied page");
            }
            Err(error) if is_fatal(&error) => {
                return Err(error).with_context(|| format!("failed to copy into {target}"));
            }
            Err(error) => {
                warn!(space = %target, title = %page.title, error = %format!("{error:#}"), "page copy failed");
                report.failures.push(PageFailure {
                    source_id: page.id.clone(),
                    title: page.title.clone(),
                    detail: format!("{error:#}"),
                });
            }
        }
    }

    info!(
        space = %target,
        copied = report.copied,
        failed = report.failures.len(),
        "space copy finished"
    );
    Ok(report)
}
