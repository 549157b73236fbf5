//! Best-effort removal of temporary folders.
//!
//! Folders handled here may still contain files an external editor holds
//! open, so removal is retried with linear backoff and never fails the
//! caller: exhaustion is only logged.

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use walkdir::WalkDir;

use crate::retry::RetryPolicy;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Delete `path` and everything below it, retrying up to `max_retries`
/// times with `base_delay * attempt` between attempts.
///
/// Returns whether the folder is gone. A path that does not exist counts as
/// clean and is not touched.
pub fn cleanup_directory_with_retries(
    path: &Path,
    context_label: &str,
    max_retries: u32,
    base_delay: Duration,
) -> bool {
    if !path.exists() {
        tracing::debug!(label = context_label, path = %path.display(), "nothing to clean up");
        return true;
    }

    let policy = RetryPolicy::linear(max_retries, base_delay);
    let result = policy.run(
        |attempt| {
            remove_tree(path).inspect_err(|e| {
                tracing::debug!(
                    label = context_label,
                    path = %path.display(),
                    attempt,
                    error = %e,
                    "cleanup attempt failed"
                );
            })
        },
        |_| true,
    );

    match result {
        Ok(()) => {
            tracing::debug!(label = context_label, path = %path.display(), "folder removed");
            true
        }
        Err(e) => {
            tracing::warn!(
                label = context_label,
                path = %path.display(),
                attempts = policy.max_attempts,
                error = %e,
                "could not remove folder, manual cleanup may be required"
            );
            false
        }
    }
}

/// [`cleanup_directory_with_retries`] with the default policy.
pub fn cleanup_directory(path: &Path, context_label: &str) -> bool {
    cleanup_directory_with_retries(path, context_label, DEFAULT_MAX_RETRIES, DEFAULT_BASE_DELAY)
}

/// Files first, then directories deepest-first, then the root.
fn remove_tree(root: &Path) -> io::Result<()> {
    remove_tree_with(root, |path| {
        clear_readonly(path);
        fs::remove_file(path)
    })
}

/// Every entry gets its own attempt; a failure is logged and the walk
/// continues. The final removal of `root` decides the outcome.
fn remove_tree_with<F>(root: &Path, remove_file: F) -> io::Result<()>
where
    F: Fn(&Path) -> io::Result<()>,
{
    if !root.exists() {
        return Ok(());
    }

    let mut dirs = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(error = %e, "cannot read folder entry");
                continue;
            }
        };
        if entry.file_type().is_dir() {
            dirs.push((entry.depth(), entry.into_path()));
        } else if let Err(e) = remove_file(entry.path()) {
            tracing::debug!(path = %entry.path().display(), error = %e, "cannot delete file");
        }
    }

    dirs.sort_by(|a, b| b.0.cmp(&a.0));
    for (_, dir) in dirs {
        if dir.exists() {
            if let Err(e) = fs::remove_dir(&dir) {
                tracing::debug!(path = %dir.display(), error = %e, "cannot delete folder");
            }
        }
    }

    if root.exists() {
        fs::remove_dir_all(root)?;
    }
    Ok(())
}

/// Clear the read-only flag so deletion is not refused.
pub(crate) fn clear_readonly(path: &Path) {
    if let Ok(meta) = fs::symlink_metadata(path) {
        let mut perms = meta.permissions();
        if perms.readonly() {
            #[allow(clippy::permissions_set_readonly_false)]
            perms.set_readonly(false);
            let _ = fs::set_permissions(path, perms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_path_is_already_clean() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("never-created");
        assert!(cleanup_directory_with_retries(&missing, "test", 3, Duration::ZERO));
        assert!(!missing.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn removes_nested_tree() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("session");
        fs::create_dir_all(root.join("a").join("b").join("c")).unwrap();
        fs::write(root.join("top.docx"), b"x").unwrap();
        fs::write(root.join("a").join("b").join("deep.htm"), b"y").unwrap();

        assert!(cleanup_directory_with_retries(&root, "test", 3, Duration::ZERO));
        assert!(!root.exists());
    }

    #[test]
    fn failing_file_does_not_stop_siblings() {
        use std::cell::RefCell;

        let dir = TempDir::new().unwrap();
        let root = dir.path().join("session");
        fs::create_dir_all(root.join("sub")).unwrap();
        for name in ["a.docx", "b.htm", "sub/c.png"] {
            fs::write(root.join(name), b"x").unwrap();
        }

        let attempted = RefCell::new(Vec::new());
        let result = remove_tree_with(&root, |path| {
            attempted.borrow_mut().push(path.to_path_buf());
            if attempted.borrow().len() == 1 {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "held open"));
            }
            fs::remove_file(path)
        });

        assert_eq!(attempted.borrow().len(), 3);
        let survivors: Vec<_> = attempted.borrow()[1..].iter().filter(|p| p.exists()).cloned().collect();
        assert!(survivors.is_empty(), "{:?}", survivors);
        // the root removal still gets its turn
        assert!(result.is_ok());
        assert!(!root.exists());
    }

    #[test]
    fn removes_readonly_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("locked");
        fs::create_dir(&root).unwrap();
        let file = root.join("firma.docx");
        fs::write(&file, b"x").unwrap();
        let mut perms = fs::metadata(&file).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&file, perms).unwrap();

        assert!(cleanup_directory(&root, "test"));
        assert!(!root.exists());
    }
}
