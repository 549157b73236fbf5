//! Core data models used throughout sigforge.
//!
//! These types describe the documents that flow into the normalization
//! pipeline, the artifacts it installs, and the signature folder contents
//! the repository reports on.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

/// HTML produced by the external converter, with the path it was read from.
///
/// The path anchors relative image references.
#[derive(Debug, Clone)]
pub struct SignatureDocument {
    pub html: String,
    pub source_path: PathBuf,
}

/// One image written to a signature's assets folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetReference {
    pub original_src: String,
    /// `None` for images decoded from `data:` URIs.
    pub resolved_source_path: Option<PathBuf>,
    pub content_hash: String,
    pub target_file_name: String,
}

/// The installed artifact set of one signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureBundle {
    pub html_path: PathBuf,
    pub text_path: PathBuf,
    /// Omitted when the assets folder ended up empty and was removed.
    pub assets_folder_path: Option<PathBuf>,
}

/// Files the external converter left in the destination folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOutput {
    pub html_path: PathBuf,
    pub rtf_path: PathBuf,
    pub txt_path: PathBuf,
    pub assets_folder_path: Option<PathBuf>,
}

/// A signature found in a signatures folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureInfo {
    pub name: String,
    pub folder_path: PathBuf,
    pub has_htm: bool,
    pub has_rtf: bool,
    pub has_txt: bool,
    pub has_files_folder: bool,
    pub has_file_folder: bool,
}

impl SignatureInfo {
    /// `"Name (HTM, RTF, TXT, Assets)"`, listing only what exists.
    pub fn display_info(&self) -> String {
        let mut parts = Vec::new();
        if self.has_htm {
            parts.push("HTM");
        }
        if self.has_rtf {
            parts.push("RTF");
        }
        if self.has_txt {
            parts.push("TXT");
        }
        if self.has_files_folder || self.has_file_folder {
            parts.push("Assets");
        }
        format!("{} ({})", self.name, parts.join(", "))
    }
}

/// A zip archive of the signatures folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupArchive {
    pub file_name: String,
    pub full_path: PathBuf,
    pub created_at: DateTime<Local>,
    pub size_bytes: u64,
}

impl BackupArchive {
    pub fn display_info(&self) -> String {
        format!(
            "{} - {} ({})",
            self.created_at.format("%d/%m/%Y %H:%M"),
            self.file_name,
            format_size(self.size_bytes)
        )
    }
}

/// Human-readable byte count with up to two decimals (`1.5 KB`).
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut len = bytes as f64;
    let mut order = 0;
    while len >= 1024.0 && order < UNITS.len() - 1 {
        order += 1;
        len /= 1024.0;
    }
    let rounded = format!("{:.2}", len);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[order])
}

/// A document template shipped alongside the tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresetFile {
    pub full_path: PathBuf,
    pub file_name: String,
    pub display_name: String,
}

/// A source document staged locally for interactive editing.
#[derive(Debug, Clone)]
pub struct EditorSession {
    pub session_id: Uuid,
    pub local_file_path: PathBuf,
    pub temp_folder: PathBuf,
    pub proposed_signature_name: String,
    pub is_opened: bool,
    pub is_saved: bool,
    pub has_unsaved_changes: bool,
    pub last_modified: DateTime<Local>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorStatus {
    NotOpened,
    OpenedNotSaved,
    Modified,
    Ready,
}

impl std::fmt::Display for EditorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            EditorStatus::NotOpened => "not yet opened",
            EditorStatus::OpenedNotSaved => "opened but not saved",
            EditorStatus::Modified => "modified (not saved)",
            EditorStatus::Ready => "saved and ready",
        };
        f.write_str(label)
    }
}

impl EditorSession {
    pub fn mark_opened(&mut self) {
        self.is_opened = true;
    }

    pub fn mark_saved(&mut self) {
        self.is_saved = true;
        self.has_unsaved_changes = false;
        self.last_modified = Local::now();
    }

    pub fn mark_modified(&mut self) {
        self.has_unsaved_changes = true;
    }

    /// The only gate that lets the conversion pipeline run.
    pub fn is_ready_for_conversion(&self) -> bool {
        self.is_opened && self.is_saved
    }

    pub fn status(&self) -> EditorStatus {
        if !self.is_opened {
            EditorStatus::NotOpened
        } else if !self.is_saved {
            EditorStatus::OpenedNotSaved
        } else if self.has_unsaved_changes {
            EditorStatus::Modified
        } else {
            EditorStatus::Ready
        }
    }
}
