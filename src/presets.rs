//! Document templates shipped in the media folder.

use std::fs;
use std::path::Path;

use crate::models::PresetFile;

const PRESET_EXTENSIONS: &[&str] = &["doc", "docx", "rtf"];

/// Top-level `.doc`, `.docx` and `.rtf` files of `media_folder`, sorted by
/// display name. Word owner files (`~$...`) are skipped.
pub fn load_presets(media_folder: &Path) -> Vec<PresetFile> {
    let entries = match fs::read_dir(media_folder) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(folder = %media_folder.display(), error = %e, "no presets folder");
            return Vec::new();
        }
    };

    let mut presets: Vec<PresetFile> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter_map(|path| {
            let file_name = path.file_name()?.to_str()?.to_string();
            if file_name.starts_with("~$") {
                return None;
            }
            let ext = path.extension()?.to_str()?.to_ascii_lowercase();
            if !PRESET_EXTENSIONS.contains(&ext.as_str()) {
                return None;
            }
            let display_name = path.file_stem()?.to_string_lossy().into_owned();
            Some(PresetFile {
                full_path: path,
                file_name,
                display_name,
            })
        })
        .collect();

    presets.sort_by(|a, b| a.display_name.to_lowercase().cmp(&b.display_name.to_lowercase()));
    tracing::debug!(count = presets.len(), "presets loaded");
    presets
}
