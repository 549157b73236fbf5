//! Signature folder management: listing, deletion and zip backups.
//!
//! A signature is the set of files sharing one stem in a signatures folder:
//!
//! ```text
//! Signatures/
//!   Firma.htm
//!   Firma.rtf
//!   Firma.txt
//!   Firma_files/          (or the legacy Firma_file/)
//!   backup_firme_onlyfirmaoutlook_2025-01-31-09-15.zip
//! ```
//!
//! Every mutating operation here is best-effort: failures are logged and
//! reported through the return value, never raised.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

use crate::models::{BackupArchive, SignatureInfo};

/// File name prefix shared by every backup archive.
pub const BACKUP_PREFIX: &str = "backup_firme_onlyfirmaoutlook_";

const BACKUP_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M";

const SIGNATURE_EXTENSIONS: &[&str] = &["htm", "rtf", "txt"];

#[derive(Debug, Clone)]
pub struct SignatureRepository {
    default_signatures_folder: PathBuf,
    output_folder: PathBuf,
}

impl SignatureRepository {
    pub fn new(default_signatures_folder: PathBuf, output_folder: PathBuf) -> Self {
        Self {
            default_signatures_folder,
            output_folder,
        }
    }

    /// The folder the mail client reads signatures from.
    pub fn default_signatures_folder(&self) -> &Path {
        &self.default_signatures_folder
    }

    pub fn output_folder(&self) -> &Path {
        &self.output_folder
    }

    /// Every signature stem found at the top level of `folder`, sorted by
    /// name. A missing folder yields an empty list.
    pub fn get_signatures(&self, folder: &Path) -> Vec<SignatureInfo> {
        let entries = match fs::read_dir(folder) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(folder = %folder.display(), error = %e, "cannot list signatures");
                }
                return Vec::new();
            }
        };

        // keyed by lowercase stem so Firma.htm and firma.TXT are one signature
        let mut found: BTreeMap<String, SignatureInfo> = BTreeMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            let ext = ext.to_ascii_lowercase();
            if !SIGNATURE_EXTENSIONS.contains(&ext.as_str()) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let info = found
                .entry(stem.to_lowercase())
                .or_insert_with(|| SignatureInfo {
                    name: stem.to_string(),
                    folder_path: folder.to_path_buf(),
                    has_htm: false,
                    has_rtf: false,
                    has_txt: false,
                    has_files_folder: folder.join(format!("{}_files", stem)).is_dir(),
                    has_file_folder: folder.join(format!("{}_file", stem)).is_dir(),
                });
            match ext.as_str() {
                "htm" => info.has_htm = true,
                "rtf" => info.has_rtf = true,
                _ => info.has_txt = true,
            }
        }

        let mut signatures: Vec<SignatureInfo> = found.into_values().collect();
        signatures.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        signatures
    }

    /// A signature exists when its `.htm` file does.
    pub fn signature_exists(&self, folder: &Path, name: &str) -> bool {
        folder.join(format!("{}.htm", name)).is_file()
    }

    /// Remove every file and asset folder of `signature`. All parts are
    /// attempted; returns false if any of them failed.
    pub fn delete_signature(&self, signature: &SignatureInfo) -> bool {
        let ok = self.delete_existing_signature_files(&signature.folder_path, &signature.name);
        if ok {
            tracing::info!(name = %signature.name, "signature deleted");
        }
        ok
    }

    /// Remove `{name}.htm|.rtf|.txt` and both asset folder conventions.
    pub fn delete_existing_signature_files(&self, folder: &Path, name: &str) -> bool {
        let mut ok = true;

        for ext in SIGNATURE_EXTENSIONS {
            let path = folder.join(format!("{}.{}", name, ext));
            if path.exists() {
                if let Err(e) = fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), error = %e, "cannot delete signature file");
                    ok = false;
                }
            }
        }

        for suffix in ["_files", "_file"] {
            let path = folder.join(format!("{}{}", name, suffix));
            if path.is_dir() {
                if let Err(e) = fs::remove_dir_all(&path) {
                    tracing::warn!(path = %path.display(), error = %e, "cannot delete assets folder");
                    ok = false;
                }
            }
        }

        ok
    }

    /// Create `folder` if needed and prove a file can be written there.
    pub fn can_write_to_folder(&self, folder: &Path) -> bool {
        if let Err(e) = fs::create_dir_all(folder) {
            tracing::warn!(folder = %folder.display(), error = %e, "cannot create folder");
            return false;
        }
        let probe = folder.join(format!(".sigforge_write_test_{}.tmp", uuid::Uuid::new_v4()));
        match fs::write(&probe, b"test") {
            Ok(()) => {
                let _ = fs::remove_file(&probe);
                true
            }
            Err(e) => {
                tracing::warn!(folder = %folder.display(), error = %e, "folder is not writable");
                false
            }
        }
    }

    /// Archive the default signatures folder. Returns `None` when there is
    /// nothing to back up or the archive could not be written.
    pub fn create_backup(&self) -> Option<BackupArchive> {
        let folder = &self.default_signatures_folder;
        match create_backup_of(folder, Local::now()) {
            Ok(Some(backup)) => {
                tracing::info!(
                    file = %backup.file_name,
                    size = backup.size_bytes,
                    "backup created"
                );
                Some(backup)
            }
            Ok(None) => {
                tracing::info!(folder = %folder.display(), "no files to back up");
                None
            }
            Err(e) => {
                tracing::warn!(folder = %folder.display(), error = %format!("{:#}", e), "backup failed");
                None
            }
        }
    }

    /// Backup archives in `folder`, newest first.
    pub fn list_backups(&self, folder: &Path) -> Vec<BackupArchive> {
        let Ok(entries) = fs::read_dir(folder) else {
            return Vec::new();
        };

        let mut backups: Vec<BackupArchive> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_backup_file(path))
            .filter_map(|path| backup_from_path(&path).ok())
            .collect();

        backups.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.file_name.cmp(&a.file_name))
        });
        backups
    }

    pub fn delete_backup(&self, backup: &BackupArchive) -> bool {
        match fs::remove_file(&backup.full_path) {
            Ok(()) => {
                tracing::info!(file = %backup.file_name, "backup deleted");
                true
            }
            Err(e) => {
                tracing::warn!(file = %backup.file_name, error = %e, "cannot delete backup");
                false
            }
        }
    }

    /// Extract `backup` into `destination`, overwriting files it contains.
    pub fn restore_backup(&self, backup: &BackupArchive, destination: &Path) -> bool {
        match extract_archive(&backup.full_path, destination) {
            Ok(()) => {
                tracing::info!(
                    file = %backup.file_name,
                    destination = %destination.display(),
                    "backup restored"
                );
                true
            }
            Err(e) => {
                tracing::warn!(file = %backup.file_name, error = %format!("{:#}", e), "restore failed");
                false
            }
        }
    }
}

pub fn is_backup_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.starts_with(BACKUP_PREFIX) && name.to_ascii_lowercase().ends_with(".zip")
}

pub fn backup_file_name(at: DateTime<Local>) -> String {
    format!("{}{}.zip", BACKUP_PREFIX, at.format(BACKUP_TIMESTAMP_FORMAT))
}

fn create_backup_of(folder: &Path, at: DateTime<Local>) -> Result<Option<BackupArchive>> {
    if !folder.is_dir() {
        return Ok(None);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(folder).min_depth(1) {
        let entry = entry.with_context(|| format!("Failed to walk {}", folder.display()))?;
        if entry.file_type().is_file() && !is_backup_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    if files.is_empty() {
        return Ok(None);
    }

    let archive_path = folder.join(backup_file_name(at));
    if archive_path.exists() {
        fs::remove_file(&archive_path)
            .with_context(|| format!("Failed to replace {}", archive_path.display()))?;
    }

    let file = File::create(&archive_path)
        .with_context(|| format!("Failed to create {}", archive_path.display()))?;
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for path in &files {
        let relative = path.strip_prefix(folder).unwrap_or(path);
        let entry_name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        zip.start_file(entry_name, options)?;
        let mut source =
            File::open(path).with_context(|| format!("Failed to read {}", path.display()))?;
        io::copy(&mut source, &mut zip)?;
    }
    zip.finish()?;

    backup_from_path(&archive_path).map(Some)
}

fn backup_from_path(path: &Path) -> Result<BackupArchive> {
    let meta = fs::metadata(path)?;
    let created = meta.created().or_else(|_| meta.modified())?;
    Ok(BackupArchive {
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        full_path: path.to_path_buf(),
        created_at: DateTime::<Local>::from(created),
        size_bytes: meta.len(),
    })
}

fn extract_archive(archive_path: &Path, destination: &Path) -> Result<()> {
    fs::create_dir_all(destination)
        .with_context(|| format!("Failed to create {}", destination.display()))?;
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("Invalid archive: {}", archive_path.display()))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        // enclosed_name rejects absolute paths and `..` traversal
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!(entry = entry.name(), "skipping unsafe archive entry");
            continue;
        };
        let target = destination.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        io::copy(&mut entry, &mut out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn repo(dir: &Path) -> SignatureRepository {
        SignatureRepository::new(dir.join("Signatures"), dir.join("Output"))
    }

    #[test]
    fn signatures_without_htm_are_listed() {
        let dir = TempDir::new().unwrap();
        let repo = repo(dir.path());
        let folder = repo.default_signatures_folder().to_path_buf();
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("X.rtf"), "{\\rtf1}").unwrap();
        fs::write(folder.join("Y.txt"), "y").unwrap();

        let signatures = repo.get_signatures(&folder);
        assert_eq!(signatures.len(), 2);
        assert_eq!(signatures[0].name, "X");
        assert!(signatures[0].has_rtf);
        assert!(!signatures[0].has_htm);
        assert_eq!(signatures[1].name, "Y");
        assert!(signatures[1].has_txt);
        assert!(!signatures[1].has_htm);
    }

    #[test]
    fn signature_parts_are_grouped_case_insensitively() {
        let dir = TempDir::new().unwrap();
        let folder = dir.path();
        fs::write(folder.join("Firma.htm"), "").unwrap();
        fs::write(folder.join("firma.TXT"), "").unwrap();
        fs::create_dir(folder.join("Firma_files")).unwrap();
        fs::write(folder.join("notes.md"), "").unwrap();

        let signatures = repo(folder).get_signatures(folder);
        assert_eq!(signatures.len(), 1);
        let firma = &signatures[0];
        assert!(firma.has_htm && firma.has_txt && firma.has_files_folder);
        assert_eq!(firma.display_info(), "Firma (HTM, TXT, Assets)");
    }

    #[test]
    fn missing_folder_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let repo = repo(dir.path());
        assert!(repo.get_signatures(&dir.path().join("absent")).is_empty());
    }

    #[test]
    fn delete_removes_all_parts() {
        let dir = TempDir::new().unwrap();
        let folder = dir.path();
        for name in ["Firma.htm", "Firma.rtf", "Firma.txt", "Altra.htm"] {
            fs::write(folder.join(name), "").unwrap();
        }
        fs::create_dir_all(folder.join("Firma_files")).unwrap();
        fs::write(folder.join("Firma_files").join("a.png"), "").unwrap();
        fs::create_dir_all(folder.join("Firma_file")).unwrap();

        let repo = repo(folder);
        assert!(repo.signature_exists(folder, "Firma"));
        assert!(repo.delete_existing_signature_files(folder, "Firma"));
        assert!(!repo.signature_exists(folder, "Firma"));
        assert!(!folder.join("Firma_files").exists());
        assert!(!folder.join("Firma_file").exists());
        assert!(folder.join("Altra.htm").exists());
    }

    #[test]
    fn writable_folder_is_created_and_probed() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("new").join("folder");
        assert!(repo(dir.path()).can_write_to_folder(&target));
        assert!(target.is_dir());
        assert_eq!(fs::read_dir(&target).unwrap().count(), 0);
    }

    #[test]
    fn backup_name_has_minute_resolution() {
        let at = Local.with_ymd_and_hms(2025, 1, 31, 9, 15, 42).unwrap();
        assert_eq!(
            backup_file_name(at),
            "backup_firme_onlyfirmaoutlook_2025-01-31-09-15.zip"
        );
    }

    #[test]
    fn empty_folder_creates_no_backup() {
        let dir = TempDir::new().unwrap();
        let repo = repo(dir.path());
        fs::create_dir_all(repo.default_signatures_folder()).unwrap();
        assert!(repo.create_backup().is_none());
    }

    #[test]
    fn backup_round_trip_excludes_prior_archives() {
        let dir = TempDir::new().unwrap();
        let repo = repo(dir.path());
        let folder = repo.default_signatures_folder().to_path_buf();
        fs::create_dir_all(folder.join("Firma_files")).unwrap();
        fs::write(folder.join("Firma.htm"), "<p>Firma</p>").unwrap();
        fs::write(folder.join("Firma_files").join("logo.png"), [1u8, 2, 3]).unwrap();
        fs::write(folder.join(format!("{}2000-01-01-00-00.zip", BACKUP_PREFIX)), "old").unwrap();

        let backup = repo.create_backup().unwrap();
        assert!(backup.file_name.starts_with(BACKUP_PREFIX));
        assert!(backup.size_bytes > 0);

        let file = File::open(&backup.full_path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["Firma.htm", "Firma_files/logo.png"]);

        let restored = dir.path().join("restored");
        assert!(repo.restore_backup(&backup, &restored));
        assert_eq!(fs::read_to_string(restored.join("Firma.htm")).unwrap(), "<p>Firma</p>");
        assert_eq!(fs::read(restored.join("Firma_files").join("logo.png")).unwrap(), [1u8, 2, 3]);
    }

    #[test]
    fn backups_listed_and_deleted() {
        let dir = TempDir::new().unwrap();
        let repo = repo(dir.path());
        let folder = repo.default_signatures_folder().to_path_buf();
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("Firma.htm"), "x").unwrap();
        fs::write(folder.join("unrelated.zip"), "x").unwrap();

        let backup = repo.create_backup().unwrap();
        let listed = repo.list_backups(&folder);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].file_name, backup.file_name);

        assert!(repo.delete_backup(&listed[0]));
        assert!(repo.list_backups(&folder).is_empty());
    }
}
