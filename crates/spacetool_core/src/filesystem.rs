use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::warn;
use walkdir::WalkDir;

use crate::extract::LocalDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryMatch {
    Exact,
    CaseInsensitive,
    Substring,
}

impl DirectoryMatch {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::CaseInsensitive => "case_insensitive",
            Self::Substring => "substring",
        }
    }
}

/// An entry the walk could not read. The rest of the tree is still scanned.
#[derive(Debug, Clone)]
pub struct WalkFailure {
    pub path: PathBuf,
    pub detail: String,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentScan {
    pub documents: Vec<LocalDocument>,
    pub skipped_unsupported: usize,
    pub walk_failures: Vec<WalkFailure>,
}

/// Find the directory for `unit` under `base_dir`: exact name, then
/// case-insensitive name, then case-insensitive substring. Candidates are
/// visited in name order so ties resolve the same way on every run.
pub fn resolve_unit_directory(
    base_dir: &Path,
    unit: &str,
) -> Result<Option<(PathBuf, DirectoryMatch)>> {
    if unit.trim().is_empty() {
        return Ok(None);
    }
    let exact = base_dir.join(unit);
    if exact.is_dir() {
        return Ok(Some((exact, DirectoryMatch::Exact)));
    }

    let entries = fs::read_dir(base_dir)
        .with_context(|| format!("failed to list {}", base_dir.display()))?;
    let mut directories = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to list {}", base_dir.display()))?;
        if !entry.file_type().is_ok_and(|kind| kind.is_dir()) {
            continue;
        }
        directories.push((entry.file_name().to_string_lossy().to_string(), entry.path()));
    }
    directories.sort_by(|left, right| left.0.cmp(&right.0));

    let wanted = unit.to_lowercase();
    if let Some((_, path)) = directories
        .iter()
        .find(|(name, _)| name.to_lowercase() == wanted)
    {
        return Ok(Some((path.clone(), DirectoryMatch::CaseInsensitive)));
    }
    if let Some((_, path)) = directories
        .iter()
        .find(|(name, _)| name.to_lowercase().contains(&wanted))
    {
        return Ok(Some((path.clone(), DirectoryMatch::Substring)));
    }
    Ok(None)
}

/// Recursively collect recognized documents below `root`, entries sorted by
/// file name within each directory. Symlinks are followed; unreadable entries,
/// dangling links and link cycles are recorded in `walk_failures`.
pub fn scan_documents(root: &Path) -> DocumentScan {
    let mut scan = DocumentScan::default();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                let path = error.path().unwrap_or(root).to_path_buf();
                warn!(path = %path.display(), error = %error, "skipping unreadable entry");
                scan.walk_failures.push(WalkFailure {
                    path,
                    detail: format!("failed to walk {}: {error}", root.display()),
                });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match LocalDocument::classify(entry.path()) {
            Some(document) => scan.documents.push(document),
            None => scan.skipped_unsupported += 1,
        }
    }
    scan
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;

    use super::{DirectoryMatch, resolve_unit_directory, scan_documents};
    use crate::extract::DocumentKind;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(path, b"fixture").expect("write file");
    }

    #[test]
    fn resolves_exact_then_case_insensitive_then_substring() {
        let temp = tempdir().expect("tempdir");
        let base = temp.path();
        fs::create_dir_all(base.join("Abraxa")).expect("dir");
        fs::create_dir_all(base.join("3kv")).expect("dir");
        fs::create_dir_all(base.join("Kunde AIB Holding (Hans Sieber GmbH) alt")).expect("dir");
        touch(&base.join("Zeta.txt"));

        let (path, kind) = resolve_unit_directory(base, "Abraxa")
            .expect("resolve")
            .expect("found");
        assert_eq!(path, base.join("Abraxa"));
        assert_eq!(kind, DirectoryMatch::Exact);

        let (path, kind) = resolve_unit_directory(base, "3KV")
            .expect("resolve")
            .expect("found");
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("3kv"));
        assert!(matches!(
            kind,
            DirectoryMatch::CaseInsensitive | DirectoryMatch::Exact
        ));

        let (path, kind) = resolve_unit_directory(base, "aib holding (hans sieber gmbh)")
            .expect("resolve")
            .expect("found");
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("Kunde AIB Holding (Hans Sieber GmbH) alt")
        );
        assert_eq!(kind, DirectoryMatch::Substring);

        assert!(resolve_unit_directory(base, "Zeta").expect("resolve").is_none());
        assert!(resolve_unit_directory(base, "Missing").expect("resolve").is_none());
    }

    #[test]
    fn missing_base_dir_is_an_error() {
        let temp = tempdir().expect("tempdir");
        assert!(resolve_unit_directory(&temp.path().join("nope"), "Unit").is_err());
    }

    #[test]
    fn scan_collects_recognized_files_recursively() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        touch(&root.join("b.pdf"));
        touch(&root.join("a.DOCX"));
        touch(&root.join("nested").join("deeper").join("c.xls"));
        touch(&root.join("nested").join("d.xlsx"));
        touch(&root.join("notes.txt"));
        touch(&root.join("image.png"));

        let scan = scan_documents(root);
        let names: Vec<String> = scan.documents.iter().map(|doc| doc.file_name()).collect();
        assert_eq!(names, vec!["a.DOCX", "b.pdf", "d.xlsx", "c.xls"]);
        assert_eq!(scan.documents[0].kind, DocumentKind::Word);
        assert_eq!(scan.documents[2].kind, DocumentKind::Spreadsheet);
        assert_eq!(scan.skipped_unsupported, 2);
        assert!(scan.walk_failures.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_entries_are_recorded_and_the_walk_continues() {
        use std::os::unix::fs::symlink;

        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        touch(&root.join("a.pdf"));
        touch(&root.join("nested").join("c.xlsx"));
        symlink(root.join("gone.pdf"), root.join("b-dangling.pdf")).expect("dangling link");
        symlink(root, root.join("nested").join("loop")).expect("loop link");
        touch(&root.join("z.docx"));

        let scan = scan_documents(root);
        let names: Vec<String> = scan.documents.iter().map(|doc| doc.file_name()).collect();
        assert_eq!(names, vec!["a.pdf", "c.xlsx", "z.docx"]);
        assert_eq!(scan.walk_failures.len(), 2);
        assert!(
            scan.walk_failures
                .iter()
                .any(|failure| failure.path.ends_with("b-dangling.pdf"))
        );
        assert!(
            scan.walk_failures
                .iter()
                .any(|failure| failure.path.ends_with("loop"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn linked_files_are_scanned() {
        use std::os::unix::fs::symlink;

        let temp = tempdir().expect("tempdir");
        let shared = temp.path().join("shared");
        let root = temp.path().join("unit");
        touch(&shared.join("policy.pdf"));
        fs::create_dir_all(&root).expect("unit dir");
        symlink(shared.join("policy.pdf"), root.join("policy.pdf")).expect("file link");

        let scan = scan_documents(&root);
        assert_eq!(scan.documents.len(), 1);
        assert_eq!(scan.documents[0].file_name(), "policy.pdf");
        assert!(scan.walk_failures.is_empty());
    }
}
