use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::chain::{ChainLink, StrategyChain};
use crate::config::ResolvedConfig;
use crate::direct::DirectResolutionStrategy;
use crate::domain::{AcquisitionRecord, AcquisitionStatus, ArtifactSource, Doi};
use crate::error::{AcquireError, HarvestError};
use crate::external_tool::{ExternalToolStrategy, ToolStatus};
use crate::filename::canonical_filename;
use crate::store::{self, PathLocks, Store};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub doi_column: String,
    pub status_column: String,
    pub jobs: usize,
}

impl From<&ResolvedConfig> for RunOptions {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            doi_column: config.doi_column.clone(),
            status_column: config.status_column.clone(),
            jobs: config.jobs,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub started_at: String,
    pub finished_at: String,
    pub save_dir: String,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped_existing: usize,
    pub records: Vec<AcquisitionRecord>,
    #[serde(skip)]
    pub catalog: Catalog,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

/// Shared stop request, checked before each row starts.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// The underlying flag, for registration with a signal handler.
    pub fn as_atomic(&self) -> Arc<AtomicBool> {
        self.0.clone()
    }
}

pub struct App {
    store: Store,
    chain: StrategyChain,
    locks: PathLocks,
}

impl App {
    pub fn new(store: Store, chain: StrategyChain) -> Self {
        Self {
            store,
            chain,
            locks: PathLocks::new(),
        }
    }

    /// Builds the standard chain: external tool first, direct resolution second.
    pub fn from_config(config: &ResolvedConfig) -> Result<Self, HarvestError> {
        let store = Store::new(config.save_dir.clone())?;
        let mut links = Vec::new();
        if config.external_tool.enabled {
            let tool = ExternalToolStrategy::new(
                config.external_tool.command.clone(),
                config.save_dir.clone(),
            );
            if let ToolStatus::Missing { message } = tool.tool_status() {
                warn!("{message}; external tool attempts will fail over to direct resolution");
            }
            links.push(ChainLink::new(tool, config.external_tool.timeout));
        }
        if config.direct.enabled {
            let direct = DirectResolutionStrategy::new(
                &config.direct.resolver_base,
                config.direct.user_agent.as_deref(),
            )?;
            links.push(ChainLink::new(direct, config.direct.timeout));
        }
        Ok(Self::new(store, StrategyChain::new(links)))
    }

    /// Processes every catalog row and returns the records plus an updated
    /// copy of the catalog. Only catalog-level problems are returned as `Err`.
    pub fn run(
        &self,
        catalog: &Catalog,
        options: &RunOptions,
        cancel: &CancelFlag,
        sink: &dyn ProgressSink,
    ) -> Result<RunResult, HarvestError> {
        let started_at = iso_timestamp();
        let dois = catalog.dois(&options.doi_column)?;
        self.store.ensure_writable()?;

        sink.event(ProgressEvent {
            message: format!(
                "phase=Resolve; {} rows, strategies: {}",
                dois.len(),
                self.chain.strategy_names().join(" -> ")
            ),
            elapsed: None,
        });

        let records: Vec<AcquisitionRecord> = if options.jobs <= 1 || dois.len() <= 1 {
            dois.iter()
                .enumerate()
                .map(|(row, doi)| self.process_row(row, dois.len(), doi.clone(), cancel, sink))
                .collect()
        } else {
            self.run_pooled(&dois, options.jobs, cancel, sink)
        };

        let flags = records
            .iter()
            .map(|record| record.status.as_flag())
            .collect::<Vec<_>>();
        let updated = catalog.with_column(&options.status_column, &flags);

        let succeeded = records
            .iter()
            .filter(|record| record.status == AcquisitionStatus::Success)
            .count();
        let skipped_existing = records
            .iter()
            .filter(|record| record.source == Some(ArtifactSource::Existing))
            .count();
        info!(
            total = records.len(),
            succeeded,
            failed = records.len() - succeeded,
            "batch finished"
        );

        Ok(RunResult {
            started_at,
            finished_at: iso_timestamp(),
            save_dir: self.store.save_dir().to_string(),
            total: records.len(),
            succeeded,
            failed: records.len() - succeeded,
            skipped_existing,
            records,
            catalog: updated,
        })
    }

    /// Single-DOI variant of [`App::run`] with the same skip and verify rules.
    pub fn acquire_one(
        &self,
        doi: &Doi,
        sink: &dyn ProgressSink,
    ) -> Result<AcquisitionRecord, HarvestError> {
        self.store.ensure_writable()?;
        Ok(self.process_row(0, 1, Ok(doi.clone()), &CancelFlag::new(), sink))
    }

    fn run_pooled(
        &self,
        dois: &[Result<Doi, String>],
        jobs: usize,
        cancel: &CancelFlag,
        sink: &dyn ProgressSink,
    ) -> Vec<AcquisitionRecord> {
        let total = dois.len();
        let next = AtomicUsize::new(0);
        let workers = jobs.min(total);

        let produced = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            for _ in 0..workers {
                handles.push(scope.spawn(|| {
                    let mut own = Vec::new();
                    loop {
                        let row = next.fetch_add(1, Ordering::Relaxed);
                        let Some(doi) = dois.get(row) else {
                            break;
                        };
                        own.push(self.process_row(row, total, doi.clone(), cancel, sink));
                    }
                    own
                }));
            }
            handles
                .into_iter()
                .filter_map(|handle| handle.join().ok())
                .flatten()
                .collect::<Vec<_>>()
        });

        let mut slots: Vec<Option<AcquisitionRecord>> = vec![None; total];
        for record in produced {
            let row = record.row;
            slots[row] = Some(record);
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(row, slot)| {
                slot.unwrap_or_else(|| {
                    let doi = dois[row].as_ref().ok().cloned();
                    AcquisitionRecord::pending(row, doi, None)
                        .fail("worker stopped before row finished")
                })
            })
            .collect()
    }

    fn process_row(
        &self,
        row: usize,
        total: usize,
        doi: Result<Doi, String>,
        cancel: &CancelFlag,
        sink: &dyn ProgressSink,
    ) -> AcquisitionRecord {
        let started = Instant::now();
        let event = |message: String| {
            sink.event(ProgressEvent {
                message,
                elapsed: Some(started.elapsed()),
            })
        };

        if cancel.is_cancelled() {
            return AcquisitionRecord::pending(row, doi.ok(), None).fail(AcquireError::Cancelled);
        }

        let doi = match doi {
            Ok(doi) => doi,
            Err(message) => {
                event(format!("row {}/{total}: invalid DOI ({message})", row + 1));
                return AcquisitionRecord::pending(row, None, None)
                    .fail(AcquireError::InvalidInput(message));
            }
        };
        event(format!("row {}/{total}: processing {doi}", row + 1));

        let filename = canonical_filename(doi.as_str());
        let path = self.store.save_dir().join(&filename);
        let record = AcquisitionRecord::pending(row, Some(doi.clone()), Some(filename));

        let lock = self.locks.lock_for(&path);
        let _guard = store::hold(&lock);

        if self.store.artifact_exists(&path) {
            event(format!("row {}/{total}: already downloaded -> {path}", row + 1));
            return record.succeed(ArtifactSource::Existing);
        }

        let mut winner = None;
        let outcome = self
            .chain
            .resolve_with_progress(&doi, path.as_std_path(), |name, outcome| {
                match outcome.failure_reason() {
                    None => {
                        winner = Some(name.to_string());
                        event(format!("row {}/{total}: {name} succeeded", row + 1));
                    }
                    Some(reason) => {
                        event(format!("row {}/{total}: {name} failed: {reason}", row + 1));
                    }
                }
            });

        match (outcome.failure_reason(), winner) {
            (None, Some(name)) if self.store.artifact_exists(&path) => {
                info!(%doi, strategy = %name, %path, "downloaded");
                record.succeed(ArtifactSource::Strategy(name))
            }
            (None, _) => {
                let reason = AcquireError::ArtifactNotProduced(format!(
                    "strategy reported success but {path} does not exist"
                ));
                event(format!("row {}/{total}: {reason}", row + 1));
                record.fail(reason)
            }
            (Some(reason), _) => {
                event(format!(
                    "row {}/{total}: all strategies failed for {doi}",
                    row + 1
                ));
                record.fail(reason)
            }
        }
    }
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
