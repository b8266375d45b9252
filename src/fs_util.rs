use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::AcquireError;

/// All files under `root` whose extension matches `ext` (ASCII case-insensitive),
/// sorted so callers see a stable order.
pub fn find_exts(root: &Path, ext: &str) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        if let Ok(entries) = fs::read_dir(&path) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if has_ext(&path, ext) {
                    out.push(path);
                }
            }
        }
    }
    out.sort();
    out
}

fn has_ext(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|value| value.to_str())
        .map(|value| value.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

/// Moves `source` onto `dest`. A plain rename is tried first; when that fails
/// (different filesystem) the bytes are copied into a temp file beside `dest`
/// and persisted, so `dest` never holds a partial file.
pub fn move_into_place(source: &Path, dest: &Path) -> Result<(), AcquireError> {
    let parent = parent_dir(dest)?;
    fs::create_dir_all(parent).map_err(|err| placement(dest, err))?;

    if fs::rename(source, dest).is_ok() {
        return Ok(());
    }

    let temp = tempfile::Builder::new()
        .prefix(".doi-harvest-move")
        .tempfile_in(parent)
        .map_err(|err| placement(dest, err))?;
    fs::copy(source, temp.path()).map_err(|err| placement(dest, err))?;
    temp.persist(dest).map_err(|err| placement(dest, err.error))?;
    let _ = fs::remove_file(source);
    Ok(())
}

/// Writes `content` to a temp file in `dest`'s directory and renames it over `dest`.
pub fn write_atomic(dest: &Path, content: &[u8]) -> Result<(), AcquireError> {
    let parent = parent_dir(dest)?;
    fs::create_dir_all(parent).map_err(|err| placement(dest, err))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".doi-harvest-part")
        .tempfile_in(parent)
        .map_err(|err| placement(dest, err))?;
    temp.write_all(content).map_err(|err| placement(dest, err))?;
    temp.flush().map_err(|err| placement(dest, err))?;
    temp.persist(dest).map_err(|err| placement(dest, err.error))?;
    Ok(())
}

fn parent_dir(dest: &Path) -> Result<&Path, AcquireError> {
    dest.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .ok_or_else(|| {
            AcquireError::PlacementError(format!("invalid destination path {}", dest.display()))
        })
}

fn placement(dest: &Path, err: io::Error) -> AcquireError {
    AcquireError::PlacementError(format!("{}: {err}", dest.display()))
}
