//! Batch processing: extract, reconcile and export many documents across a
//! pool of worker threads.
//!
//! Each document is handled start to finish by one worker. Failures are
//! recorded per document and never stop the rest of the batch.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;

use relative_path::{RelativePath, RelativePathBuf};
use serde::Serialize;

use crate::error::ExportError;
use crate::export::Exporter;
use crate::extract::{ExtractOptions, Extractor};
use crate::io::{self, SourceSet};
use crate::models::{DocumentModel, Outcome};
use crate::repository::Repository;
use crate::versioning::{DiffEngine, VersionTracker};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub extract: ExtractOptions,
    pub exporter: Exporter,
    pub output_dir: PathBuf,
    /// Worker threads; 0 uses the available parallelism.
    pub workers: usize,
    pub reconcile_retries: u32,
    /// Export every document, not only created or updated ones.
    pub force_export: bool,
    /// Write `diffs/<slug>.diff` under the output directory on update.
    pub write_diffs: bool,
    pub diff_context: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            extract: ExtractOptions::default(),
            exporter: Exporter::default(),
            output_dir: PathBuf::from("dist"),
            workers: 0,
            reconcile_retries: 3,
            force_export: false,
            write_diffs: false,
            diff_context: crate::versioning::DEFAULT_CONTEXT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Warning,
    Error,
}

/// What happened to one source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentReport {
    pub path: String,
    pub status: Status,
    pub outcome: Option<Outcome>,
    pub warnings: Vec<String>,
    pub error: Option<String>,
    pub exported: Option<PathBuf>,
}

impl DocumentReport {
    fn failed(path: &RelativePath, warnings: Vec<String>, error: impl ToString) -> Self {
        Self {
            path: path.to_string(),
            status: Status::Error,
            outcome: None,
            warnings,
            error: Some(error.to_string()),
            exported: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub documents: Vec<DocumentReport>,
}

impl BatchReport {
    pub fn count(&self, status: Status) -> usize {
        self.documents.iter().filter(|d| d.status == status).count()
    }

    pub fn count_outcome(&self, matches: impl Fn(Outcome) -> bool) -> usize {
        self.documents
            .iter()
            .filter(|d| d.outcome.is_some_and(&matches))
            .count()
    }

    /// 1 when any document failed, otherwise 0. Warnings do not count.
    pub fn exit_code(&self) -> i32 {
        if self.count(Status::Error) > 0 { 1 } else { 0 }
    }
}

pub struct Pipeline<'r> {
    repo: &'r dyn Repository,
    options: PipelineOptions,
    extractor: Extractor,
    tracker: VersionTracker,
}

impl<'r> Pipeline<'r> {
    pub fn new(repo: &'r dyn Repository, options: PipelineOptions) -> Self {
        Self {
            repo,
            extractor: Extractor::new(options.extract),
            tracker: VersionTracker::new(options.exporter),
            options,
        }
    }

    fn worker_count(&self, jobs: usize) -> usize {
        let wanted = match self.options.workers {
            0 => thread::available_parallelism().map_or(1, |n| n.get()),
            n => n,
        };
        wanted.clamp(1, jobs.max(1))
    }

    /// Process every file of `sources`. Reports come back in source order.
    pub fn run(&self, sources: &SourceSet) -> BatchReport {
        let jobs = &sources.files;
        let next = AtomicUsize::new(0);
        let results: Mutex<Vec<(usize, DocumentReport)>> = Mutex::new(Vec::with_capacity(jobs.len()));

        thread::scope(|scope| {
            for _ in 0..self.worker_count(jobs.len()) {
                scope.spawn(|| {
                    loop {
                        let idx = next.fetch_add(1, Ordering::SeqCst);
                        let Some(path) = jobs.get(idx) else { break };
                        let report = self.process(&sources.root, path);
                        results
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push((idx, report));
                    }
                });
            }
        });

        let mut results = results.into_inner().unwrap_or_else(PoisonError::into_inner);
        results.sort_by_key(|(idx, _)| *idx);
        let report = BatchReport {
            documents: results.into_iter().map(|(_, report)| report).collect(),
        };

        log::info!(
            "processed {} documents: {} created, {} updated, {} unchanged, {} failed",
            report.documents.len(),
            report.count_outcome(|o| o == Outcome::Created),
            report.count_outcome(|o| matches!(o, Outcome::Updated(_))),
            report.count_outcome(|o| o == Outcome::Unchanged),
            report.count(Status::Error),
        );
        report
    }

    /// Extract, reconcile and (when changed) export a single document.
    pub fn process(&self, root: &Path, path: &RelativePath) -> DocumentReport {
        let model = match self.extractor.extract_file(path, root) {
            Ok(model) => model,
            Err(err) => {
                log::error!("{path}: extraction failed: {err}");
                return DocumentReport::failed(path, Vec::new(), err);
            }
        };
        let warnings: Vec<String> = model.warnings().iter().map(ToString::to_string).collect();

        let outcome = match self
            .tracker
            .reconcile_with_retry(&model, self.repo, self.options.reconcile_retries)
        {
            Ok(outcome) => outcome,
            Err(err) => {
                log::error!("{path}: reconcile failed: {err}");
                return DocumentReport::failed(path, warnings, err);
            }
        };

        let mut exported = None;
        if self.needs_export(&model, outcome) {
            match self.export(&model, outcome) {
                Ok(document) => exported = Some(document),
                Err(err) => {
                    log::error!("{path}: export failed: {err}");
                    let mut report = DocumentReport::failed(path, warnings, err);
                    report.outcome = Some(outcome);
                    return report;
                }
            }
        }

        DocumentReport {
            path: path.to_string(),
            status: if warnings.is_empty() {
                Status::Success
            } else {
                Status::Warning
            },
            outcome: Some(outcome),
            warnings,
            error: None,
            exported,
        }
    }

    /// Changed and forced documents are always exported. Unchanged ones are
    /// exported again when the artifacts on disk lag behind the store, as
    /// happens when an earlier export failed after its version was saved.
    fn needs_export(&self, model: &DocumentModel, outcome: Outcome) -> bool {
        if outcome.is_change() || self.options.force_export {
            return true;
        }
        let latest = match self.repo.latest_version(model.identity()) {
            Ok(Some(version)) => version.version_number,
            Ok(None) | Err(_) => return true,
        };
        let exported = self
            .options
            .exporter
            .exported_version(model, &self.options.output_dir);
        if exported == Some(latest) {
            return false;
        }
        log::info!(
            "{}: artifacts are behind v{latest}, exporting again",
            model.path()
        );
        true
    }

    fn export(&self, model: &DocumentModel, outcome: Outcome) -> Result<PathBuf, ExportError> {
        let history = self.repo.history(model.identity())?;
        let paths = self
            .options
            .exporter
            .write(model, &history, &self.options.output_dir)?;

        if self.options.write_diffs
            && let Outcome::Updated(number) = outcome
            && let [.., older, newer] = history.as_slice()
            && newer.version_number == number
        {
            let lines = DiffEngine::new(self.options.diff_context).diff(older, newer)?;
            let (document, _) = self.options.exporter.artifact_paths(model);
            let diff_path = RelativePathBuf::from("diffs")
                .join(document.with_extension("diff"));
            io::write_file(&diff_path, &self.options.output_dir, &(lines.join("\n") + "\n"))?;
        }

        Ok(paths.document)
    }
}
