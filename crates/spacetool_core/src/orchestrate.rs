//! Per-unit drivers behind the `copy`, `ingest` and `docs-root` commands.
//!
//! Every unit is handled on its own: a failure is recorded in the unit's
//! outcome and the run moves on to the next unit. Credential rejections
//! from the store are the exception and end the run immediately.

use anyhow::{Result, anyhow};
use serde::Serialize;
use tracing::{error, info};

use crate::extract::ContentExtractor;
use crate::ingest::{
    DocumentationRoot, IngestOptions, IngestReport, IngestStatus, ensure_documentation_root,
    ingest_unit,
};
use crate::replicate::{ReplicationOptions, ReplicationReport, replicate};
use crate::space_key::{SpaceKey, derive_space_key};
use crate::store::{ContentStore, is_fatal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    /// Target space already existed; nothing was done.
    Skipped,
    Copied,
    Ingested,
    RootReady,
    Failed,
}

impl UnitStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Copied => "copied",
            Self::Ingested => "ingested",
            Self::RootReady => "root_ready",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitOutcome {
    pub unit: String,
    pub space: SpaceKey,
    pub status: UnitStatus,
    pub reason: Option<String>,
    pub replication: Option<ReplicationReport>,
    pub ingestion: Option<IngestReport>,
    pub documentation_root: Option<DocumentationRoot>,
}

impl UnitOutcome {
    fn new(unit: &str, space: &SpaceKey, status: UnitStatus) -> Self {
        Self {
            unit: unit.to_string(),
            space: space.clone(),
            status,
            reason: None,
            replication: None,
            ingestion: None,
            documentation_root: None,
        }
    }

    fn failed(unit: &str, space: &SpaceKey, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        error!(unit, space = %space, reason = %reason, "unit failed");
        let mut outcome = Self::new(unit, space, UnitStatus::Failed);
        outcome.reason = Some(reason);
        outcome
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub command: &'static str,
    pub units: Vec<UnitOutcome>,
    pub request_count: usize,
}

impl RunReport {
    pub fn failed_units(&self) -> Vec<&UnitOutcome> {
        self.units
            .iter()
            .filter(|outcome| outcome.status == UnitStatus::Failed)
            .collect()
    }

    pub fn count(&self, status: UnitStatus) -> usize {
        self.units
            .iter()
            .filter(|outcome| outcome.status == status)
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct CopyOptions {
    pub source: SpaceKey,
    pub replication: ReplicationOptions,
}

/// Derived key for every name, in input order.
pub fn preview_keys(names: &[String]) -> Vec<(String, SpaceKey)> {
    names
        .iter()
        .map(|name| (name.clone(), derive_space_key(name)))
        .collect()
}

/// Create a space for every unit that does not have one yet and copy the
/// source space into it. Existing spaces are left alone.
pub fn run_copy<S: ContentStore>(
    store: &mut S,
    units: &[String],
    options: &CopyOptions,
) -> Result<RunReport> {
    let mut outcomes = Vec::with_capacity(units.len());
    for unit in units {
        let space = derive_space_key(unit);
        info!(unit = %unit, space = %space, "processing unit");
        outcomes.push(copy_unit(store, unit, &space, options)?);
    }
    Ok(RunReport {
        command: "copy",
        units: outcomes,
        request_count: store.request_count(),
    })
}

fn copy_unit<S: ContentStore>(
    store: &mut S,
    unit: &str,
    space: &SpaceKey,
    options: &CopyOptions,
) -> Result<UnitOutcome> {
    match store.space_exists(space) {
        Ok(true) => {
            info!(unit, space = %space, "space already exists, skipping");
            return Ok(UnitOutcome::new(unit, space, UnitStatus::Skipped));
        }
        Ok(false) => {}
        Err(error) => return recover(unit, space, error, "space lookup failed"),
    }

    if let Err(error) = store.create_space(space, unit) {
        return recover(unit, space, error, "space creation failed");
    }
    info!(unit, space = %space, "created space");

    match replicate(store, &options.source, space, &options.replication) {
        Ok(report) => {
            let mut outcome = UnitOutcome::new(unit, space, UnitStatus::Copied);
            outcome.replication = Some(report);
            Ok(outcome)
        }
        Err(error) => recover(unit, space, error, "copy failed"),
    }
}

/// Ingest the local document directory of every unit into its space.
pub fn run_ingest<S: ContentStore>(
    store: &mut S,
    extractor: &ContentExtractor,
    units: &[String],
    options: &IngestOptions,
) -> Result<RunReport> {
    let mut outcomes = Vec::with_capacity(units.len());
    for unit in units {
        let space = derive_space_key(unit);
        info!(unit = %unit, space = %space, "processing unit");
        outcomes.push(ingest_one(store, extractor, unit, &space, options)?);
    }
    Ok(RunReport {
        command: "ingest",
        units: outcomes,
        request_count: store.request_count(),
    })
}

fn ingest_one<S: ContentStore>(
    store: &mut S,
    extractor: &ContentExtractor,
    unit: &str,
    space: &SpaceKey,
    options: &IngestOptions,
) -> Result<UnitOutcome> {
    if let Some(failure) = require_space(store, unit, space)? {
        return Ok(failure);
    }

    let report = match ingest_unit(store, extractor, unit, space, options) {
        Ok(report) => report,
        Err(error) => return recover(unit, space, error, "ingestion failed"),
    };

    let mut outcome = match report.status {
        IngestStatus::Completed => UnitOutcome::new(unit, space, UnitStatus::Ingested),
        IngestStatus::HomepageMissing => {
            UnitOutcome::failed(unit, space, format!("space {space} has no homepage"))
        }
        IngestStatus::DirectoryMissing => UnitOutcome::failed(
            unit,
            space,
            format!(
                "no directory matching {unit:?} under {}",
                options.base_dir.display()
            ),
        ),
    };
    outcome.documentation_root = report.documentation_root.clone();
    outcome.ingestion = Some(report);
    Ok(outcome)
}

/// Make sure every unit's space has a documentation root page under its
/// homepage, without touching any local files.
pub fn run_docs_root<S: ContentStore>(
    store: &mut S,
    units: &[String],
    title: &str,
    body: &str,
) -> Result<RunReport> {
    let mut outcomes = Vec::with_capacity(units.len());
    for unit in units {
        let space = derive_space_key(unit);
        info!(unit = %unit, space = %space, "processing unit");
        if let Some(failure) = require_space(store, unit, &space)? {
            outcomes.push(failure);
            continue;
        }
        let outcome = match ensure_documentation_root(store, &space, title, body) {
            Ok(Some(root)) => {
                let mut outcome = UnitOutcome::new(unit, &space, UnitStatus::RootReady);
                outcome.documentation_root = Some(root);
                outcome
            }
            Ok(None) => {
                UnitOutcome::failed(unit, &space, format!("space {space} has no homepage"))
            }
            Err(error) => recover(unit, &space, error, "documentation root setup failed")?,
        };
        outcomes.push(outcome);
    }
    Ok(RunReport {
        command: "docs-root",
        units: outcomes,
        request_count: store.request_count(),
    })
}

/// `Some(failed outcome)` when the unit's space is missing or cannot be
/// checked.
fn require_space<S: ContentStore>(
    store: &mut S,
    unit: &str,
    space: &SpaceKey,
) -> Result<Option<UnitOutcome>> {
    match store.space_exists(space) {
        Ok(true) => Ok(None),
        Ok(false) => Ok(Some(UnitOutcome::failed(
            unit,
            space,
            format!("space {space} does not exist"),
        ))),
        Err(error) => recover(unit, space, error, "space lookup failed").map(Some),
    }
}

/// Fatal store errors end the run; anything else fails only this unit.
fn recover(
    unit: &str,
    space: &SpaceKey,
    error: anyhow::Error,
    what: &str,
) -> Result<UnitOutcome> {
    if is_fatal(&error) {
        return Err(error.context(format!("{what} for unit {unit:?} ({space})")));
    }
    Ok(UnitOutcome::failed(unit, space, format!("{what}: {error:#}")))
}

/// Summary error listing the failed units, or `Ok` when none failed.
pub fn ensure_no_failures(report: &RunReport) -> Result<()> {
    let failed = report.failed_units();
    if failed.is_empty() {
        return Ok(());
    }
    let names: Vec<&str> = failed.iter().map(|outcome| outcome.unit.as_str()).collect();
    Err(anyhow!(
        "{} of {} unit(s) failed during `{}`: {}",
        failed.len(),
        report.units.len(),
        report.command,
        names.join(", ")
    ))
}
