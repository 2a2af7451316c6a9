//! Host memory checks performed before weights are loaded

use std::path::Path;
use sysinfo::System;

use crate::types::ModelLoadError;

/// Memory currently available to new allocations, in bytes.
pub fn available_memory_bytes() -> u64 {
    let mut system = System::new();
    system.refresh_memory();
    system.available_memory()
}

/// Size of the model file, failing if it is not a readable regular file.
pub fn model_file_size(path: &Path) -> Result<u64, ModelLoadError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(meta.len()),
        _ => Err(ModelLoadError::ModelFileNotFound {
            path: path.to_path_buf(),
        }),
    }
}

/// Fail with [`ModelLoadError::InsufficientMemory`] when the weights cannot fit.
pub fn ensure_fits_in_memory(path: &Path) -> Result<u64, ModelLoadError> {
    let required_bytes = model_file_size(path)?;
    check_fit(required_bytes, available_memory_bytes())
}

fn check_fit(required_bytes: u64, available_bytes: u64) -> Result<u64, ModelLoadError> {
    if required_bytes > available_bytes {
        return Err(ModelLoadError::InsufficientMemory {
            required_bytes,
            available_bytes,
        });
    }
    Ok(required_bytes)
}
