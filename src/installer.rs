//! Final write of the signature files.
//!
//! No backup and no existence check happen here; the workflow decides
//! whether overwriting is allowed before calling [`install`].

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::models::SignatureBundle;

/// Write `{name}.htm` and `{name}.txt` into `destination`, replacing any
/// existing files. The returned bundle carries no assets folder; the caller
/// fills it in.
pub fn install(
    destination: &Path,
    signature_name: &str,
    html: &str,
    plain_text: &str,
) -> Result<SignatureBundle> {
    fs::create_dir_all(destination)
        .with_context(|| format!("Failed to create {}", destination.display()))?;

    let html_path = destination.join(format!("{}.htm", signature_name));
    let text_path = destination.join(format!("{}.txt", signature_name));

    fs::write(&html_path, html)
        .with_context(|| format!("Failed to write {}", html_path.display()))?;
    fs::write(&text_path, plain_text)
        .with_context(|| format!("Failed to write {}", text_path.display()))?;

    tracing::info!(
        html = %html_path.display(),
        text = %text_path.display(),
        "signature installed"
    );

    Ok(SignatureBundle {
        html_path,
        text_path,
        assets_folder_path: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_html_and_text() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("nested").join("Signatures");
        let bundle = install(&dest, "Firma", "<p>Ciao</p>", "Ciao").unwrap();

        assert_eq!(bundle.html_path, dest.join("Firma.htm"));
        assert_eq!(fs::read_to_string(&bundle.html_path).unwrap(), "<p>Ciao</p>");
        assert_eq!(fs::read_to_string(&bundle.text_path).unwrap(), "Ciao");
        assert!(bundle.assets_folder_path.is_none());
    }

    #[test]
    fn overwrites_existing_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Firma.htm"), "old").unwrap();
        install(dir.path(), "Firma", "new", "new text").unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("Firma.htm")).unwrap(), "new");
    }
}
