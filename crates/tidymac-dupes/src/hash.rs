//! SHA-256 digests for the exact-duplicate stages.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use tidymac_core::{Result, TidyError};

/// Bytes hashed by the prefix stage.
pub const PREFIX_LEN: usize = 4096;

/// Chunk size for full-content hashing.
const CHUNK_LEN: usize = 1024 * 1024;

/// SHA-256 of the first [`PREFIX_LEN`] bytes (the whole file when shorter).
pub fn prefix_digest(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| TidyError::io(path, e))?;
    let mut reader = BufReader::new(file).take(PREFIX_LEN as u64);
    let mut buffer = Vec::with_capacity(PREFIX_LEN);
    reader
        .read_to_end(&mut buffer)
        .map_err(|e| TidyError::io(path, e))?;

    let mut hasher = Sha256::new();
    hasher.update(&buffer);
    Ok(format!("{:x}", hasher.finalize()))
}

/// SHA-256 of the complete file content.
///
/// Reads in chunks and enforces `timeout` between chunks, so a stalled or
/// enormous file cannot wedge the pipeline; in-flight chunk I/O always
/// completes before the check.
pub fn full_digest(path: &Path, timeout: Duration) -> Result<String> {
    let file = File::open(path).map_err(|e| TidyError::io(path, e))?;
    let mut reader = BufReader::with_capacity(CHUNK_LEN, file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_LEN];
    let start = Instant::now();

    loop {
        let n = reader.read(&mut buffer).map_err(|e| TidyError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        if start.elapsed() > timeout {
            return Err(TidyError::BudgetExceeded {
                message: format!(
                    "hashing {} exceeded {}s",
                    path.display(),
                    timeout.as_secs()
                ),
            });
        }
    }

    Ok(format!("{:x}", hasher.finalize()))
}
