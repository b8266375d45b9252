use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::Doi;
use crate::error::HarvestError;
use crate::external_tool::TEMP_DIR_PREFIX;
use crate::filename::{canonical_filename, legacy_filename};

/// The save directory holding one `<canonical>.pdf` per acquired DOI.
#[derive(Debug, Clone)]
pub struct Store {
    save_dir: Utf8PathBuf,
}

impl Store {
    pub fn new(save_dir: PathBuf) -> Result<Self, HarvestError> {
        let save_dir = Utf8PathBuf::from_path_buf(save_dir).map_err(|path| {
            HarvestError::Filesystem(format!("non-utf8 save directory {}", path.display()))
        })?;
        Ok(Self { save_dir })
    }

    pub fn save_dir(&self) -> &Utf8Path {
        &self.save_dir
    }

    pub fn artifact_path(&self, doi: &Doi) -> Utf8PathBuf {
        self.save_dir.join(canonical_filename(doi.as_str()))
    }

    pub fn legacy_artifact_path(&self, doi: &Doi) -> Option<Utf8PathBuf> {
        let name = legacy_filename(doi.as_str());
        // The old scheme only replaced `/`; a native separator still splits the name.
        if name.contains(std::path::MAIN_SEPARATOR) {
            return None;
        }
        Some(self.save_dir.join(name))
    }

    pub fn artifact_exists(&self, path: &Utf8Path) -> bool {
        path.as_std_path().is_file()
    }

    /// Creates the save directory, proves a file can be written there and
    /// clears scratch directories left by an interrupted tool run.
    pub fn ensure_writable(&self) -> Result<(), HarvestError> {
        let unwritable = |message: String| HarvestError::SaveDirUnwritable {
            path: self.save_dir.clone().into_std_path_buf(),
            message,
        };
        fs::create_dir_all(self.save_dir.as_std_path())
            .map_err(|err| unwritable(err.to_string()))?;
        tempfile::Builder::new()
            .prefix(".doi-harvest-probe")
            .tempfile_in(self.save_dir.as_std_path())
            .map_err(|err| unwritable(err.to_string()))?;
        self.sweep_scratch_dirs();
        Ok(())
    }

    // A forced exit skips `TempDir` cleanup, so leftovers are removed on the next start.
    fn sweep_scratch_dirs(&self) {
        let Ok(entries) = fs::read_dir(self.save_dir.as_std_path()) else {
            return;
        };
        for entry in entries.flatten() {
            let is_scratch = entry.file_name().to_string_lossy().starts_with(TEMP_DIR_PREFIX)
                && entry.file_type().is_ok_and(|kind| kind.is_dir());
            if !is_scratch {
                continue;
            }
            let path = entry.path();
            match fs::remove_dir_all(&path) {
                Ok(()) => info!(path = %path.display(), "removed stale scratch directory"),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to remove scratch directory")
                }
            }
        }
    }

    /// Renames files saved under the old `/`→`_` naming to their canonical names.
    pub fn migrate_legacy<'a, I>(&self, dois: I) -> Result<MigrationReport, HarvestError>
    where
        I: IntoIterator<Item = &'a Doi>,
    {
        let mut report = MigrationReport::default();
        for doi in dois {
            let canonical = self.artifact_path(doi);
            if self.artifact_exists(&canonical) {
                report.already_canonical += 1;
                continue;
            }
            let Some(legacy) = self.legacy_artifact_path(doi) else {
                report.missing += 1;
                continue;
            };
            if !self.artifact_exists(&legacy) {
                report.missing += 1;
                continue;
            }
            fs::rename(legacy.as_std_path(), canonical.as_std_path())
                .map_err(|err| HarvestError::Filesystem(format!("rename {legacy}: {err}")))?;
            info!(%doi, from = %legacy, to = %canonical, "migrated legacy filename");
            report.renamed.push(MigratedFile {
                doi: doi.to_string(),
                from: legacy.to_string(),
                to: canonical.to_string(),
            });
        }
        Ok(report)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub renamed: Vec<MigratedFile>,
    pub already_canonical: usize,
    pub missing: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigratedFile {
    pub doi: String,
    pub from: String,
    pub to: String,
}

/// One mutex per destination path, so two workers never probe and write the
/// same artifact at once.
#[derive(Debug, Default)]
pub struct PathLocks {
    locks: Mutex<HashMap<Utf8PathBuf, Arc<Mutex<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, path: &Utf8Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

pub fn hold(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}
