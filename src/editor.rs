//! Staging of source documents for interactive editing.
//!
//! Each session gets its own folder under the manager's base folder, named
//! by session id, holding a private copy of the document. The copy is what
//! the external editor opens, so the user's original is never touched.
//! Session folders are removed through [`crate::cleanup`] because the editor
//! may still hold the copy open.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::cleanup::{self, clear_readonly};
use crate::models::EditorSession;

#[derive(Debug, Clone)]
pub struct EditorSessionManager {
    base_folder: PathBuf,
    cleanup_retries: u32,
    cleanup_base_delay: Duration,
}

impl EditorSessionManager {
    pub fn new(base_folder: PathBuf, cleanup_retries: u32, cleanup_base_delay: Duration) -> Self {
        Self {
            base_folder,
            cleanup_retries,
            cleanup_base_delay,
        }
    }

    pub fn base_folder(&self) -> &Path {
        &self.base_folder
    }

    /// Copy `source` into a fresh session folder.
    pub fn prepare_for_editing(&self, source: &Path, proposed_name: &str) -> Result<EditorSession> {
        if !source.is_file() {
            anyhow::bail!("Source document not found: {}", source.display());
        }

        let session_id = Uuid::new_v4();
        let temp_folder = self.session_folder(session_id);
        fs::create_dir_all(&temp_folder)
            .with_context(|| format!("Failed to create session folder: {}", temp_folder.display()))?;

        let file_name = source
            .file_name()
            .with_context(|| format!("Source has no file name: {}", source.display()))?;
        let local_file_path = temp_folder.join(file_name);

        if let Err(e) = fs::copy(source, &local_file_path) {
            self.cleanup_session(session_id);
            return Err(e).with_context(|| {
                format!("Failed to copy {} for editing", source.display())
            });
        }
        clear_readonly(&local_file_path);

        tracing::info!(
            session = %session_id,
            file = %local_file_path.display(),
            "document staged for editing"
        );

        Ok(EditorSession {
            session_id,
            local_file_path,
            temp_folder,
            proposed_signature_name: proposed_name.to_string(),
            is_opened: false,
            is_saved: false,
            has_unsaved_changes: false,
            last_modified: Local::now(),
        })
    }

    /// Whether the staged copy is still where the session expects it.
    pub fn validate(&self, session: &EditorSession) -> bool {
        let ok = session.local_file_path.is_file();
        if !ok {
            tracing::warn!(session = %session.session_id, "staged document has disappeared");
        }
        ok
    }

    pub fn cleanup_session(&self, session_id: Uuid) -> bool {
        cleanup::cleanup_directory_with_retries(
            &self.session_folder(session_id),
            &format!("editor session {}", session_id),
            self.cleanup_retries,
            self.cleanup_base_delay,
        )
    }

    /// Remove session folders last modified at least `max_age` ago, except
    /// the folder of `keep`. Returns how many were removed.
    pub fn cleanup_orphaned(&self, max_age: Duration, keep: Option<Uuid>) -> usize {
        let Ok(entries) = fs::read_dir(&self.base_folder) else {
            return 0;
        };
        let keep_name = keep.map(|id| id.to_string());
        let now = SystemTime::now();

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if keep_name.as_deref() == path.file_name().and_then(|n| n.to_str()) {
                continue;
            }
            // clock skew reads as age zero
            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(|modified| now.duration_since(modified).unwrap_or(Duration::ZERO));
            if age.is_ok_and(|age| age >= max_age)
                && cleanup::cleanup_directory_with_retries(
                    &path,
                    "orphaned editor session",
                    self.cleanup_retries,
                    self.cleanup_base_delay,
                )
            {
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(removed, "orphaned editor sessions removed");
        }
        removed
    }

    /// Remove every session folder regardless of age.
    pub fn cleanup_all(&self) -> usize {
        self.cleanup_orphaned(Duration::ZERO, None)
    }

    fn session_folder(&self, session_id: Uuid) -> PathBuf {
        self.base_folder.join(session_id.to_string())
    }
}

/// `\\server\share` or `//server/share` network paths.
pub fn is_unc_path(path: &Path) -> bool {
    let s = path.to_string_lossy();
    s.starts_with(r"\\") || s.starts_with("//")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(dir: &Path) -> EditorSessionManager {
        EditorSessionManager::new(dir.join("EditorTemp"), 3, Duration::ZERO)
    }

    #[test]
    fn prepare_copies_into_unique_folder() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("firma.docx");
        fs::write(&source, b"doc").unwrap();
        let mgr = manager(dir.path());

        let a = mgr.prepare_for_editing(&source, "Firma").unwrap();
        let b = mgr.prepare_for_editing(&source, "Firma").unwrap();

        assert_ne!(a.session_id, b.session_id);
        assert_ne!(a.temp_folder, b.temp_folder);
        assert!(a.temp_folder.starts_with(mgr.base_folder()));
        assert_eq!(fs::read(&a.local_file_path).unwrap(), b"doc");
        assert!(!a.is_ready_for_conversion());
        assert!(mgr.validate(&a));
    }

    #[test]
    fn missing_source_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(dir.path());
        assert!(mgr.prepare_for_editing(&dir.path().join("absent.docx"), "x").is_err());
    }

    #[test]
    fn cleanup_session_removes_folder() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("firma.docx");
        fs::write(&source, b"doc").unwrap();
        let mgr = manager(dir.path());
        let session = mgr.prepare_for_editing(&source, "Firma").unwrap();

        assert!(mgr.cleanup_session(session.session_id));
        assert!(!session.temp_folder.exists());
        assert!(!mgr.validate(&session));
        // second call finds nothing to do
        assert!(mgr.cleanup_session(session.session_id));
    }

    #[test]
    fn cleanup_all_keeps_nothing_but_orphan_sweep_keeps_current() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("firma.docx");
        fs::write(&source, b"doc").unwrap();
        let mgr = manager(dir.path());
        let current = mgr.prepare_for_editing(&source, "Firma").unwrap();
        let stale = mgr.prepare_for_editing(&source, "Firma").unwrap();

        assert_eq!(mgr.cleanup_orphaned(Duration::ZERO, Some(current.session_id)), 1);
        assert!(current.temp_folder.exists());
        assert!(!stale.temp_folder.exists());

        assert_eq!(mgr.cleanup_orphaned(Duration::from_secs(3600), None), 0);
        assert!(current.temp_folder.exists());

        assert_eq!(mgr.cleanup_all(), 1);
        assert!(!current.temp_folder.exists());
    }

    #[test]
    fn unc_paths_detected() {
        assert!(is_unc_path(Path::new(r"\\server\share\firma.docx")));
        assert!(is_unc_path(Path::new("//server/share/firma.docx")));
        assert!(!is_unc_path(Path::new("/home/user/firma.docx")));
        assert!(!is_unc_path(Path::new(r"C:\firma.docx")));
    }
}
