//! The staging store: content-preserving move-to-quarantine.
//!
//! Each soft session owns `<state>/staging/<session-id>/`, mode 0700. A
//! staged file keeps its full original path beneath the staging root
//! (`/home/alice/.cache/foo` stages to `<root>/home/alice/.cache/foo`), so
//! undo is a rename back and nothing can collide.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use tidymac_core::{Result, TidyError};

/// Outcome of staging one path.
#[derive(Debug, Clone)]
pub struct StagedFile {
    /// Where the content now lives.
    pub staged_path: PathBuf,
    /// Size in bytes (aggregate for directories).
    pub size_bytes: u64,
    /// Modification time captured before the move.
    pub mtime: std::time::SystemTime,
    /// Content digest, when verification was requested (files only).
    pub content_sha256: Option<String>,
}

/// Session-scoped quarantine directory.
#[derive(Debug)]
pub struct StagingStore {
    root: PathBuf,
    verify: bool,
}

impl StagingStore {
    /// Create the staging root for a session.
    pub fn create(staging_dir: &Path, session_id: &str, verify: bool) -> Result<Self> {
        let root = staging_dir.join(session_id);
        fs::create_dir_all(&root).map_err(|e| TidyError::io(&root, e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&root, fs::Permissions::from_mode(0o700))
                .map_err(|e| TidyError::io(&root, e))?;
        }
        Ok(Self { root, verify })
    }

    /// The staging root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Destination for an original path: the full path mirrored beneath the
    /// staging root.
    pub fn staged_path_for(&self, original: &Path) -> PathBuf {
        let relative: PathBuf = original
            .components()
            .filter(|c| matches!(c, std::path::Component::Normal(_)))
            .collect();
        self.root.join(relative)
    }

    /// Move a file or directory into the staging area.
    ///
    /// Directories move as a single rename of the directory node. A rename
    /// that crosses devices falls back to copy-then-unlink with size (and
    /// optionally digest) verification; permissions and mtimes are restored
    /// explicitly on that path.
    pub fn stage(&self, original: &Path) -> Result<StagedFile> {
        let metadata = fs::symlink_metadata(original).map_err(|e| TidyError::io(original, e))?;
        let mtime = metadata
            .modified()
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        let is_dir = metadata.is_dir();
        let size_bytes = if is_dir {
            dir_size(original)
        } else {
            metadata.len()
        };
        let content_sha256 = if self.verify && !is_dir {
            Some(content_sha256(original)?)
        } else {
            None
        };

        let staged_path = self.staged_path_for(original);
        if let Some(parent) = staged_path.parent() {
            fs::create_dir_all(parent).map_err(|e| TidyError::io(parent, e))?;
        }

        match fs::rename(original, &staged_path) {
            Ok(()) => {}
            Err(rename_err) => {
                debug!(
                    original = %original.display(),
                    error = %rename_err,
                    "rename failed, falling back to copy"
                );
                if is_dir {
                    copy_dir_recursive(original, &staged_path)?;
                    verify_sizes(original, &staged_path, size_bytes)?;
                    fs::remove_dir_all(original).map_err(|e| TidyError::io(original, e))?;
                } else {
                    fs::copy(original, &staged_path).map_err(|e| TidyError::io(original, e))?;
                    let copied = fs::metadata(&staged_path)
                        .map_err(|e| TidyError::io(&staged_path, e))?;
                    if copied.len() != size_bytes {
                        let _ = fs::remove_file(&staged_path);
                        return Err(TidyError::VerificationFailed {
                            path: original.to_path_buf(),
                            message: format!(
                                "size mismatch after copy: {} != {}",
                                copied.len(),
                                size_bytes
                            ),
                        });
                    }
                    if let Some(expected) = &content_sha256 {
                        let actual = content_sha256_of(&staged_path)?;
                        if &actual != expected {
                            let _ = fs::remove_file(&staged_path);
                            return Err(TidyError::VerificationFailed {
                                path: original.to_path_buf(),
                                message: "content digest mismatch after copy".to_string(),
                            });
                        }
                    }
                    restore_file_attrs(&staged_path, &metadata, mtime);
                    fs::remove_file(original).map_err(|e| TidyError::io(original, e))?;
                }
            }
        }

        Ok(StagedFile {
            staged_path,
            size_bytes,
            mtime,
            content_sha256,
        })
    }
}

/// SHA-256 of a file's content.
pub fn content_sha256(path: &Path) -> Result<String> {
    content_sha256_of(path)
}

fn content_sha256_of(path: &Path) -> Result<String> {
    let file = fs::File::open(path).map_err(|e| TidyError::io(path, e))?;
    let mut reader = std::io::BufReader::with_capacity(1024 * 1024, file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 1024 * 1024];
    loop {
        let n = reader.read(&mut buffer).map_err(|e| TidyError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Restore permissions and mtime after a copy fallback.
fn restore_file_attrs(path: &Path, original_meta: &fs::Metadata, mtime: std::time::SystemTime) {
    let _ = fs::set_permissions(path, original_meta.permissions());
    if let Ok(file) = fs::File::options().write(true).open(path) {
        let _ = file.set_times(fs::FileTimes::new().set_modified(mtime));
    }
}

fn verify_sizes(original: &Path, copy: &Path, expected: u64) -> Result<()> {
    let copied = dir_size(copy);
    if copied != expected {
        let _ = fs::remove_dir_all(copy);
        return Err(TidyError::VerificationFailed {
            path: original.to_path_buf(),
            message: format!("directory size mismatch after copy: {copied} != {expected}"),
        });
    }
    Ok(())
}

fn dir_size(path: &Path) -> u64 {
    walkdir::WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).map_err(|e| TidyError::io(dst, e))?;
    for entry in fs::read_dir(src).map_err(|e| TidyError::io(src, e))? {
        let entry = entry.map_err(|e| TidyError::io(src, e))?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if src_path.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path).map_err(|e| TidyError::io(&src_path, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_staged_path_mirrors_original() {
        let temp = TempDir::new().unwrap();
        let store = StagingStore::create(temp.path(), "2024-01-01T00-00-00", false).unwrap();
        let staged = store.staged_path_for(Path::new("/Users/alice/.cache/foo/bar"));
        assert_eq!(
            staged,
            temp.path()
                .join("2024-01-01T00-00-00/Users/alice/.cache/foo/bar")
        );
    }

    #[test]
    fn test_stage_moves_file_and_preserves_content() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("data/file.bin");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, b"precious bytes").unwrap();

        let store = StagingStore::create(&temp.path().join("staging"), "s1", true).unwrap();
        let staged = store.stage(&source).unwrap();

        assert!(!source.exists());
        assert!(staged.staged_path.exists());
        assert_eq!(fs::read(&staged.staged_path).unwrap(), b"precious bytes");
        assert_eq!(staged.size_bytes, 14);
        assert!(staged.content_sha256.is_some());
    }

    #[test]
    fn test_stage_directory_moves_node_whole() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("tree/node_modules");
        fs::create_dir_all(dir.join("pkg")).unwrap();
        fs::write(dir.join("pkg/index.js"), vec![0u8; 256]).unwrap();

        let store = StagingStore::create(&temp.path().join("staging"), "s1", false).unwrap();
        let staged = store.stage(&dir).unwrap();

        assert!(!dir.exists());
        assert!(staged.staged_path.join("pkg/index.js").exists());
        assert_eq!(staged.size_bytes, 256);
    }

    #[test]
    fn test_stage_missing_path_fails() {
        let temp = TempDir::new().unwrap();
        let store = StagingStore::create(&temp.path().join("staging"), "s1", false).unwrap();
        let err = store.stage(&temp.path().join("gone")).unwrap_err();
        assert_eq!(err.kind(), "path_not_found");
    }

    #[cfg(unix)]
    #[test]
    fn test_staging_root_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let temp = TempDir::new().unwrap();
        let store = StagingStore::create(&temp.path().join("staging"), "s1", false).unwrap();
        let mode = fs::metadata(store.root()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn test_content_sha256_known_value() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("abc");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(
            content_sha256(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
