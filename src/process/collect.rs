//! Result-collecting fold shared by the dataset-family parsers.
//!
//! Each (url, table kind) pair yields either rows or a [`Failure`]. Successes
//! are concatenated in URL order, failures are kept for the run report, and the
//! total-failure check runs once at the end.

use std::fs;
use std::path::{Path, PathBuf};

use crate::diagnostics::{Diagnostics, Event, Stage};
use crate::error::{ExtractError, PipelineError, TableError};
use crate::fetch::zips::{archive_file_name, Downloader};
use crate::process::{load_csv_from_archive, RawTable};
use crate::process::mapping::{map_table, Canonical, MappedTable};

/// A unit of work that was skipped.
#[derive(Clone, Debug, PartialEq)]
pub struct Failure {
    pub family: &'static str,
    pub url: String,
    /// `None` when the whole archive was lost at download time.
    pub kind: Option<&'static str>,
    pub stage: Stage,
    pub reason: String,
}

/// Rows of one table kind gathered across archives.
pub(crate) struct KindAccumulator<R> {
    family: &'static str,
    kind: &'static str,
    pattern: &'static str,
    batches: Vec<Vec<R>>,
}

impl<R: Canonical> KindAccumulator<R> {
    pub(crate) fn new(family: &'static str, kind: &'static str, pattern: &'static str) -> Self {
        Self {
            family,
            kind,
            pattern,
            batches: Vec::new(),
        }
    }

    /// Extract and map this kind from one archive; a failure only skips this kind.
    pub(crate) fn absorb(
        &mut self,
        url: &str,
        zip_path: &Path,
        diagnostics: &dyn Diagnostics,
        failures: &mut Vec<Failure>,
    ) {
        let raw = load_csv_from_archive(zip_path, self.pattern);
        self.absorb_raw(url, raw, diagnostics, failures);
    }

    /// Map a table some other reader produced, with the same skip policy.
    pub(crate) fn absorb_raw(
        &mut self,
        url: &str,
        raw: Result<RawTable, ExtractError>,
        diagnostics: &dyn Diagnostics,
        failures: &mut Vec<Failure>,
    ) {
        match map_raw::<R>(raw) {
            Ok(mapped) => {
                if !mapped.gaps.is_empty() {
                    diagnostics.emit(Event::ColumnGap {
                        kind: self.kind,
                        source: url.to_string(),
                        missing: mapped.gaps.clone(),
                    });
                }
                diagnostics.emit(Event::TableParsed {
                    family: self.family,
                    kind: self.kind,
                    source: url.to_string(),
                    rows: mapped.rows.len(),
                });
                self.batches.push(mapped.rows);
            }
            Err(e) => {
                diagnostics.emit(Event::TableFailed {
                    family: self.family,
                    kind: self.kind,
                    url: url.to_string(),
                    reason: e.to_string(),
                });
                failures.push(Failure {
                    family: self.family,
                    url: url.to_string(),
                    kind: Some(self.kind),
                    stage: Stage::Extract,
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Number of archives this kind was read from.
    pub(crate) fn succeeded(&self) -> usize {
        self.batches.len()
    }

    pub(crate) fn concat(self) -> Vec<R> {
        self.batches.into_iter().flatten().collect()
    }
}

fn map_raw<R: Canonical>(raw: Result<RawTable, ExtractError>) -> Result<MappedTable<R>, TableError> {
    Ok(map_table::<R>(&raw?)?)
}

/// `<workdir>/cvm/<family>`, created if needed.
pub(crate) fn staging_dir(workdir: &Path, family: &str) -> Result<PathBuf, PipelineError> {
    let dir = workdir.join("cvm").join(family);
    fs::create_dir_all(&dir).map_err(|source| PipelineError::Io {
        path: dir.clone(),
        source,
    })?;
    Ok(dir)
}

/// Download every URL in order, handing each archive to `on_archive`.
/// Download failures are recorded and the loop moves on.
pub(crate) async fn for_each_archive<D, F>(
    downloader: &D,
    urls: &[String],
    staging: &Path,
    family: &'static str,
    diagnostics: &dyn Diagnostics,
    failures: &mut Vec<Failure>,
    mut on_archive: F,
) where
    D: Downloader,
    F: FnMut(&str, &Path, &mut Vec<Failure>),
{
    for url in urls {
        let dest = staging.join(archive_file_name(url));
        let zip_path = match downloader.fetch(url, &dest).await {
            Ok(path) => path,
            Err(e) => {
                diagnostics.emit(Event::DownloadFailed {
                    url: url.clone(),
                    reason: e.to_string(),
                });
                failures.push(Failure {
                    family,
                    url: url.clone(),
                    kind: None,
                    stage: Stage::Download,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        diagnostics.emit(Event::ArchiveDownloaded { url: url.clone() });
        on_archive(url, &zip_path, failures);
    }
}
