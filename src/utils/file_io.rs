use std::fs::create_dir_all;
use std::path::Path;

use tracing::error;

use crate::Result;
use crate::StorageError;

pub fn create_dir_if_not_exist(path: &Path) -> Result<()> {
    if !path.exists() {
        if let Err(e) = create_dir_all(path) {
            error!("Failed to create directory {:?}: {:?}", path, e);
            return Err(StorageError::PathError {
                path: path.to_path_buf(),
                source: e,
            }
            .into());
        }
    }
    Ok(())
}

pub fn create_parent_dir_if_not_exist(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) => create_dir_if_not_exist(parent),
        None => Ok(()),
    }
}

/// Removes a directory tree; a missing directory is not an error.
pub fn remove_dir_if_exist(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::PathError {
            path: path.to_path_buf(),
            source: e,
        }
        .into()),
    }
}
