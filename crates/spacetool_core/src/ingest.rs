use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::extract::{ContentExtractor, LocalDocument};
use crate::filesystem::{DirectoryMatch, resolve_unit_directory, scan_documents};
use crate::space_key::SpaceKey;
use crate::store::{ContentStore, NewPage, PageId, is_fatal};

pub const DOCUMENT_TITLE_PREFIX: &str = "Document: ";

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub base_dir: PathBuf,
    pub documentation_title: String,
    pub documentation_body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RootOrigin {
    Existing,
    Created,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentationRoot {
    pub id: PageId,
    pub origin: RootOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Completed,
    HomepageMissing,
    DirectoryMissing,
}

impl IngestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::HomepageMissing => "homepage_missing",
            Self::DirectoryMissing => "directory_missing",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub file: PathBuf,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub unit: String,
    pub space: SpaceKey,
    pub status: IngestStatus,
    pub documentation_root: Option<DocumentationRoot>,
    pub directory: Option<PathBuf>,
    pub directory_match: Option<DirectoryMatch>,
    /// Recognized files that were attempted.
    pub files_processed: usize,
    pub pages_created: usize,
    pub attachments_uploaded: usize,
    pub skipped_unsupported: usize,
    pub failures: Vec<FileFailure>,
}

impl IngestReport {
    fn new(unit: &str, space: &SpaceKey, status: IngestStatus) -> Self {
        Self {
            unit: unit.to_string(),
            space: space.clone(),
            status,
            documentation_root: None,
            directory: None,
            directory_match: None,
            files_processed: 0,
            pages_created: 0,
            attachments_uploaded: 0,
            skipped_unsupported: 0,
            failures: Vec::new(),
        }
    }
}

pub fn document_page_title(file_name: &str) -> String {
    format!("{DOCUMENT_TITLE_PREFIX}{file_name}")
}

/// Find the documentation root by title, or create it under the space
/// homepage. `None` means the space has no homepage to hang it under.
pub fn ensure_documentation_root<S: ContentStore>(
    store: &mut S,
    space: &SpaceKey,
    title: &str,
    body: &str,
) -> Result<Option<DocumentationRoot>> {
    if let Some(id) = store
        .find_page_by_title(space, title)
        .with_context(|| format!("failed to look up page {title:?} in {space}"))?
    {
        return Ok(Some(DocumentationRoot {
            id,
            origin: RootOrigin::Existing,
        }));
    }

    let Some(homepage) = store
        .homepage_id(space)
        .with_context(|| format!("failed to look up homepage of {space}"))?
    else {
        warn!(space = %space, "space has no homepage");
        return Ok(None);
    };

    let request = NewPage {
        title: title.to_string(),
        body: body.to_string(),
        parent_id: Some(homepage),
    };
    let id = store
        .create_page(space, &request)
        .with_context(|| format!("failed to create page {title:?} in {space}"))?;
    info!(space = %space, title, id = %id, "created documentation root");
    Ok(Some(DocumentationRoot {
        id,
        origin: RootOrigin::Created,
    }))
}

/// Turn every recognized file in the unit's directory into a child page of
/// the documentation root. Running this twice creates every page twice.
pub fn ingest_unit<S: ContentStore>(
    store: &mut S,
    extractor: &ContentExtractor,
    unit: &str,
    space: &SpaceKey,
    options: &IngestOptions,
) -> Result<IngestReport> {
    let Some(root) = ensure_documentation_root(
        store,
        space,
        &options.documentation_title,
        &options.documentation_body,
    )?
    else {
        return Ok(IngestReport::new(unit, space, IngestStatus::HomepageMissing));
    };

    let mut report = IngestReport::new(unit, space, IngestStatus::Completed);
    report.documentation_root = Some(root.clone());

    let Some((directory, matched)) = resolve_unit_directory(&options.base_dir, unit)? else {
        warn!(unit, base_dir = %options.base_dir.display(), "no directory found for unit");
        report.status = IngestStatus::DirectoryMissing;
        return Ok(report);
    };
    info!(unit, directory = %directory.display(), matched = matched.as_str(), "ingesting directory");
    report.directory = Some(directory.clone());
    report.directory_match = Some(matched);

    let scan = scan_documents(&directory);
    report.skipped_unsupported = scan.skipped_unsupported;
    report
        .failures
        .extend(scan.walk_failures.into_iter().map(|failure| FileFailure {
            file: failure.path,
            detail: failure.detail,
        }));

    for document in &scan.documents {
        report.files_processed += 1;
        match ingest_document(store, extractor, space, &root.id, document) {
            Ok(outcome) => {
                report.pages_created += 1;
                if outcome.attached {
                    report.attachments_uploaded += 1;
                }
            }
            Err(error) if is_fatal(&error) => return Err(error),
            Err(error) => {
                warn!(
                    unit,
                    file = %document.path.display(),
                    error = %format!("{error:#}"),
                    "document ingestion failed"
                );
                report.failures.push(FileFailure {
                    file: document.path.clone(),
                    detail: format!("{error:#}"),
                });
            }
        }
    }

    info!(
        unit,
        space = %space,
        files = report.files_processed,
        pages = report.pages_created,
        failed = report.failures.len(),
        "unit ingestion finished"
    );
    Ok(report)
}

struct DocumentOutcome {
    attached: bool,
}

fn ingest_document<S: ContentStore>(
    store: &mut S,
    extractor: &ContentExtractor,
    space: &SpaceKey,
    root_id: &str,
    document: &LocalDocument,
) -> Result<DocumentOutcome> {
    let file_name = document.file_name();
    let mut body = extractor.extract(document);

    let attached = match store.upload_attachment(root_id, &document.path) {
        Ok(link) => {
            body.push_str(&link);
            true
        }
        Err(error) if is_fatal(&error) => return Err(error),
        Err(error) => {
            warn!(file = %file_name, error = %format!("{error:#}"), "attachment upload failed");
            false
        }
    };

    let title = document_page_title(&file_name);
    let request = NewPage {
        title: title.clone(),
        body,
        parent_id: Some(root_id.to_string()),
    };
    let id = store
        .create_page(space, &request)
        .with_context(|| format!("failed to create page {title:?}"))?;
    info!(space = %space, title = %title, id = %id, kind = document.kind.as_str(), "created document page");
    Ok(DocumentOutcome { attached })
}
