//! Detecting when an external editor has saved and closed a staged document.
//!
//! Editors give no completion signal, so this is inferred. Filesystem
//! notifications on the session folder wake the monitor up, and every poll
//! also probes the staged file directly:
//!
//! - a newer modification time means the document was saved
//! - a lock (exclusive-open refusal or an owner file next to the document)
//!   means it is open
//! - a lock that disappears means the editor closed it
//! - the launched editor process exiting while the document is unlocked
//!   means it was closed, for editors that leave no lock behind

use anyhow::{Context, Result};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use crate::models::EditorSession;

/// An editor process that exits sooner than this without a save is taken to
/// be a launcher handing the document to an already running instance.
pub const LAUNCHER_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorEvent {
    Opened,
    Saved,
    Closed,
}

pub struct EditorMonitor {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<notify::Result<Event>>,
    file: PathBuf,
    last_modified: Option<SystemTime>,
    was_locked: bool,
    poll_interval: Duration,
    editor: Option<(Child, Instant)>,
    /// How long the editor process ran, once it has exited and the close
    /// has not been reported yet.
    editor_ran_for: Option<Duration>,
}

impl EditorMonitor {
    /// Start watching the folder of `session`'s staged document.
    pub fn new(session: &EditorSession, poll_interval: Duration) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
        watcher
            .watch(&session.temp_folder, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", session.temp_folder.display()))?;

        Ok(Self {
            _watcher: watcher,
            rx,
            file: session.local_file_path.clone(),
            last_modified: modified_time(&session.local_file_path),
            was_locked: false,
            poll_interval,
            editor: None,
            editor_ran_for: None,
        })
    }

    /// Also treat the exit of `child` as a close signal.
    pub fn attach_editor(&mut self, child: Child) {
        self.editor = Some((child, Instant::now()));
    }

    fn check_editor_exit(&mut self) {
        let Some((child, started)) = self.editor.as_mut() else {
            return;
        };
        let ran_for = started.elapsed();
        match child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(%status, ran_ms = ran_for.as_millis() as u64, "editor process exited");
                self.editor_ran_for = Some(ran_for);
                self.editor = None;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "cannot query editor process, relying on file locks");
                self.editor = None;
            }
        }
    }

    /// Drain notifications, probe the document and update `session`.
    pub fn poll(&mut self, session: &mut EditorSession) -> Vec<EditorEvent> {
        let mut events = Vec::new();
        self.check_editor_exit();

        let mut notified = 0usize;
        while let Ok(event) = self.rx.try_recv() {
            match event {
                Ok(_) => notified += 1,
                Err(e) => tracing::debug!(error = %e, "watch error"),
            }
        }
        if notified > 0 {
            tracing::debug!(count = notified, file = %self.file.display(), "folder changed");
        }

        let locked = is_file_locked(&self.file);
        if locked && !session.is_opened {
            session.mark_opened();
            events.push(EditorEvent::Opened);
            tracing::info!(session = %session.session_id, "document opened in editor");
        }

        let modified = modified_time(&self.file);
        if modified.is_some() && modified > self.last_modified {
            self.last_modified = modified;
            // a save implies the document was opened even if the lock was missed
            if !session.is_opened {
                session.mark_opened();
                events.push(EditorEvent::Opened);
            }
            session.mark_saved();
            events.push(EditorEvent::Saved);
            tracing::info!(session = %session.session_id, "document saved");
        } else if locked && session.is_saved && notified > 0 {
            session.mark_modified();
        }

        let closed_by_lock = self.was_locked && !locked;
        let closed_by_exit = !locked
            && self
                .editor_ran_for
                .is_some_and(|ran| session.is_saved || ran >= LAUNCHER_GRACE);
        if closed_by_lock || closed_by_exit {
            self.editor_ran_for = None;
            events.push(EditorEvent::Closed);
            tracing::info!(session = %session.session_id, status = %session.status(), "document closed");
        }
        self.was_locked = locked;

        events
    }

    /// Poll until the editor closes the document or `timeout` elapses.
    /// Returns whether a close was observed.
    pub fn wait_until_closed(&mut self, session: &mut EditorSession, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if self.poll(session).contains(&EditorEvent::Closed) {
                return true;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::warn!(session = %session.session_id, "timed out waiting for the editor");
                return false;
            }
            thread::sleep(self.poll_interval);
        }
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Owner files office suites create beside an open document.
pub fn owner_files(path: &Path) -> Vec<PathBuf> {
    let (Some(parent), Some(name)) = (path.parent(), path.file_name().and_then(|n| n.to_str()))
    else {
        return Vec::new();
    };
    vec![
        parent.join(format!(".~lock.{}#", name)),
        parent.join(format!("~${}", name)),
    ]
}

/// Whether another process has `path` open for editing.
pub fn is_file_locked(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    owner_files(path).iter().any(|p| p.exists()) || exclusive_open_refused(path)
}

#[cfg(windows)]
fn exclusive_open_refused(path: &Path) -> bool {
    use std::os::windows::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .read(true)
        .write(true)
        .share_mode(0)
        .open(path)
        .is_err()
}

#[cfg(not(windows))]
fn exclusive_open_refused(_path: &Path) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::EditorSessionManager;
    use std::fs::File;
    use tempfile::TempDir;

    fn staged(dir: &Path) -> EditorSession {
        let source = dir.join("firma.docx");
        fs::write(&source, b"doc").unwrap();
        EditorSessionManager::new(dir.join("EditorTemp"), 3, Duration::ZERO)
            .prepare_for_editing(&source, "Firma")
            .unwrap()
    }

    fn touch_later(path: &Path) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60)).unwrap();
    }

    #[test]
    fn owner_file_marks_document_locked() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("firma.docx");
        fs::write(&doc, b"x").unwrap();
        assert!(!is_file_locked(&doc));

        fs::write(dir.path().join(".~lock.firma.docx#"), b"").unwrap();
        assert!(is_file_locked(&doc));
    }

    #[test]
    fn missing_file_is_not_locked() {
        let dir = TempDir::new().unwrap();
        assert!(!is_file_locked(&dir.path().join("absent.docx")));
    }

    #[test]
    fn open_save_close_sequence() {
        let dir = TempDir::new().unwrap();
        let mut session = staged(dir.path());
        let mut monitor = EditorMonitor::new(&session, Duration::from_millis(10)).unwrap();
        let lock = owner_files(&session.local_file_path).remove(0);

        assert!(monitor.poll(&mut session).is_empty());

        fs::write(&lock, b"").unwrap();
        assert_eq!(monitor.poll(&mut session), vec![EditorEvent::Opened]);
        assert!(!session.is_ready_for_conversion());

        touch_later(&session.local_file_path);
        assert_eq!(monitor.poll(&mut session), vec![EditorEvent::Saved]);
        assert!(session.is_ready_for_conversion());

        fs::remove_file(&lock).unwrap();
        assert!(monitor.wait_until_closed(&mut session, Some(Duration::from_secs(5))));
    }

    #[test]
    fn save_without_lock_still_counts_as_opened() {
        let dir = TempDir::new().unwrap();
        let mut session = staged(dir.path());
        let mut monitor = EditorMonitor::new(&session, Duration::from_millis(10)).unwrap();

        touch_later(&session.local_file_path);
        let events = monitor.poll(&mut session);
        assert_eq!(events, vec![EditorEvent::Opened, EditorEvent::Saved]);
        assert!(session.is_ready_for_conversion());
    }

    fn exiting_process() -> Child {
        std::process::Command::new(std::env::current_exe().unwrap())
            .arg("--list")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .unwrap()
    }

    #[test]
    fn editor_exit_after_save_closes_without_lock() {
        let dir = TempDir::new().unwrap();
        let mut session = staged(dir.path());
        let mut monitor = EditorMonitor::new(&session, Duration::from_millis(10)).unwrap();
        monitor.attach_editor(exiting_process());

        touch_later(&session.local_file_path);
        assert!(monitor.wait_until_closed(&mut session, Some(Duration::from_secs(30))));
        assert!(session.is_ready_for_conversion());
    }

    #[test]
    fn quick_launcher_exit_defers_to_lock() {
        let dir = TempDir::new().unwrap();
        let mut session = staged(dir.path());
        let mut monitor = EditorMonitor::new(&session, Duration::from_millis(10)).unwrap();
        let lock = owner_files(&session.local_file_path).remove(0);
        fs::write(&lock, b"").unwrap();

        let mut launcher = exiting_process();
        launcher.wait().unwrap();
        monitor.attach_editor(launcher);

        let events = monitor.poll(&mut session);
        assert_eq!(events, vec![EditorEvent::Opened]);

        touch_later(&session.local_file_path);
        assert_eq!(monitor.poll(&mut session), vec![EditorEvent::Saved]);

        fs::remove_file(&lock).unwrap();
        assert_eq!(monitor.poll(&mut session), vec![EditorEvent::Closed]);
        assert!(monitor.poll(&mut session).is_empty());
    }

    #[test]
    fn wait_times_out_without_close() {
        let dir = TempDir::new().unwrap();
        let mut session = staged(dir.path());
        let mut monitor = EditorMonitor::new(&session, Duration::from_millis(10)).unwrap();
        assert!(!monitor.wait_until_closed(&mut session, Some(Duration::from_millis(50))));
    }
}
