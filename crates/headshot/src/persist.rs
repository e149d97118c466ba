//! Writing artifacts to the output directory.
//!
//! Files are opened create-new: an existing file is never overwritten. When
//! a name is taken, `-1`, `-2`, … is inserted before the extension.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::PersistError;

/// Upper bound on disambiguating suffixes tried for one name.
const MAX_SUFFIX_ATTEMPTS: u32 = 1000;

fn candidate_path(dir: &Path, file_name: &str, attempt: u32) -> PathBuf {
    if attempt == 0 {
        return dir.join(file_name);
    }
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => dir.join(format!("{stem}-{attempt}.{ext}")),
        None => dir.join(format!("{stem}-{attempt}")),
    }
}

/// Write `bytes` under `dir/file_name`, never replacing an existing file.
///
/// Returns the path actually written.
pub fn write_new(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf, PersistError> {
    std::fs::create_dir_all(dir).map_err(|source| PersistError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    for attempt in 0..MAX_SUFFIX_ATTEMPTS {
        let path = candidate_path(dir, file_name, attempt);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(source) => return Err(PersistError::Write { path, source }),
        };
        if attempt > 0 {
            tracing::info!("{file_name} already exists, saving as {}", path.display());
        }
        file.write_all(bytes)
            .and_then(|()| file.flush())
            .map_err(|source| PersistError::Write {
                path: path.clone(),
                source,
            })?;
        return Ok(path);
    }

    Err(PersistError::Exhausted(
        dir.join(file_name),
        MAX_SUFFIX_ATTEMPTS,
    ))
}
