//! Repository root discovery.
//!
//! The proxy stores recordings, its download cache and the merged certificate
//! bundle relative to the root of the git repository that owns the tests. The
//! root is found by walking up from any file or directory inside the repository
//! until a directory containing `.git` is found.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors raised while locating the repository root.
#[derive(Debug, Error)]
pub enum RepoError {
    /// No ancestor of the start path contains a `.git` entry.
    #[error("'{start}' does not exist within a git repository")]
    NotInRepository {
        /// The path the search started from.
        start: PathBuf,
    },

    /// A relative start path could not be resolved against the working directory.
    #[error("cannot resolve '{start}' against the current directory: {source}")]
    CurrentDir {
        /// The relative path the search started from.
        start: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
}

/// Ascend from `start` until a directory containing `.git` is found.
///
/// `start` may be a file or a directory. A `.git` file (worktrees, submodules)
/// counts the same as a `.git` directory. A relative `start` is resolved
/// against the current working directory first.
pub fn find_repo_root(start: &Path) -> Result<PathBuf, RepoError> {
    if start.is_absolute() {
        return ascend(start);
    }
    let cwd = std::env::current_dir().map_err(|source| RepoError::CurrentDir {
        start: start.to_path_buf(),
        source,
    })?;
    find_repo_root_from(&cwd, start)
}

/// Resolve `start` against `base` and ascend from there.
fn find_repo_root_from(base: &Path, start: &Path) -> Result<PathBuf, RepoError> {
    ascend(&base.join(start))
}

fn ascend(start: &Path) -> Result<PathBuf, RepoError> {
    let mut current = if start.is_file() {
        start.parent().map(Path::to_path_buf)
    } else {
        Some(start.to_path_buf())
    };

    while let Some(dir) = current {
        if dir.join(".git").exists() {
            debug!(root = %dir.display(), "Discovered repository root");
            return Ok(dir);
        }
        current = dir.parent().map(Path::to_path_buf);
    }

    Err(RepoError::NotInRepository {
        start: start.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_finds_root_from_nested_dir() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        let nested = dir.path().join("sdk").join("storage").join("tests");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_repo_root(&nested).unwrap(), dir.path());
    }

    #[test]
    fn test_finds_root_from_file() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        let file = dir.path().join("conftest.rs");
        fs::write(&file, "").unwrap();

        assert_eq!(find_repo_root(&file).unwrap(), dir.path());
    }

    #[test]
    fn test_git_file_marks_root() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".git"), "gitdir: ../.git/worktrees/x").unwrap();

        assert_eq!(find_repo_root(dir.path()).unwrap(), dir.path());
    }

    #[test]
    fn test_relative_start_resolves_against_working_dir() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        let sdk = dir.path().join("sdk");
        fs::create_dir_all(sdk.join("storage")).unwrap();

        let root = find_repo_root_from(&sdk, Path::new("storage")).unwrap();
        assert_eq!(root, dir.path());

        let root = find_repo_root_from(dir.path(), Path::new("sdk")).unwrap();
        assert_eq!(root, dir.path());
        assert!(root.is_absolute());
    }

    #[test]
    fn test_relative_file_start_resolves_against_working_dir() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::create_dir(dir.path().join("sdk")).unwrap();
        fs::write(dir.path().join("sdk").join("conftest.rs"), "").unwrap();

        let root = find_repo_root_from(dir.path(), Path::new("sdk/conftest.rs")).unwrap();
        assert_eq!(root, dir.path());
    }

    #[test]
    fn test_outside_repo_is_error() {
        let dir = tempdir().unwrap();
        // tempdirs normally live outside any repository
        if find_repo_root(dir.path()).is_ok() {
            return;
        }
        let err = find_repo_root(dir.path()).unwrap_err();
        assert!(matches!(err, RepoError::NotInRepository { .. }));
    }
}
