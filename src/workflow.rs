//! Orchestration of one signature conversion.
//!
//! The stages always run in this order:
//!
//! ```text
//! converter ─▶ tolerant read ─▶ inline CSS ─▶ normalize ─▶ resolve images ─▶ install
//! ```
//!
//! CSS must be inlined before the style cleanup pass sees it, and images are
//! resolved on the final markup so rewritten paths survive. Preconditions
//! (source present, destination writable) are checked before any stage
//! runs, so a failed precondition never leaves partial output behind.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::assets::{self, AssetOptions};
use crate::converter::DocumentConverter;
use crate::inliner::inline_css;
use crate::installer;
use crate::models::{AssetReference, BackupArchive, SignatureBundle, SignatureDocument};
use crate::naming;
use crate::normalize::normalize;
use crate::repository::SignatureRepository;
use crate::retry::{read_to_string_with_retry, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionOptions {
    pub fix_table_borders: bool,
    pub embed_images: bool,
    pub use_absolute_paths: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            fix_table_borders: true,
            embed_images: true,
            use_absolute_paths: false,
        }
    }
}

impl ConversionOptions {
    fn asset_options(&self) -> AssetOptions {
        AssetOptions {
            use_absolute_paths: self.use_absolute_paths,
            embed_images: self.embed_images,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversionOutcome {
    pub bundle: SignatureBundle,
    pub rtf_path: Option<PathBuf>,
    /// The HTML that was installed.
    pub normalized: String,
    pub assets: Vec<AssetReference>,
}

pub struct SignatureWorkflow {
    repository: SignatureRepository,
    converter: Box<dyn DocumentConverter>,
    read_policy: RetryPolicy,
}

impl SignatureWorkflow {
    pub fn new(repository: SignatureRepository, converter: Box<dyn DocumentConverter>) -> Self {
        Self {
            repository,
            converter,
            read_policy: RetryPolicy::default(),
        }
    }

    pub fn with_read_policy(mut self, policy: RetryPolicy) -> Self {
        self.read_policy = policy;
        self
    }

    pub fn repository(&self) -> &SignatureRepository {
        &self.repository
    }

    pub fn build_final_signature_name(&self, base_name: &str, identifier: Option<&str>) -> String {
        naming::build_final_signature_name(base_name, identifier)
    }

    /// Backups are only taken when writing into the folder the mail client
    /// reads from.
    pub fn should_create_backup(&self, destination: &Path) -> bool {
        comparable_path(destination) == comparable_path(self.repository.default_signatures_folder())
    }

    pub fn create_backup_if_needed(&self, destination: &Path) -> Option<BackupArchive> {
        if !self.should_create_backup(destination) {
            tracing::debug!(destination = %destination.display(), "backup not needed");
            return None;
        }
        self.repository.create_backup()
    }

    pub fn signature_exists(&self, destination: &Path, name: &str) -> bool {
        self.repository.signature_exists(destination, name)
    }

    pub fn delete_existing_signature_files(&self, destination: &Path, name: &str) -> bool {
        self.repository.delete_existing_signature_files(destination, name)
    }

    /// Make room for `name` in `destination`.
    ///
    /// An existing signature is an error unless `overwrite` is set; then a
    /// backup is attempted (when `backup` is set and the destination needs
    /// one) and the old files are removed. A failed backup does not block
    /// the overwrite.
    pub fn prepare_destination(
        &self,
        destination: &Path,
        name: &str,
        overwrite: bool,
        backup: bool,
    ) -> Result<Option<BackupArchive>> {
        if !self.signature_exists(destination, name) {
            return Ok(None);
        }
        if !overwrite {
            bail!(
                "Signature '{}' already exists in {} (use --overwrite to replace it)",
                name,
                destination.display()
            );
        }

        let archive = if backup {
            self.create_backup_if_needed(destination)
        } else {
            None
        };
        if !self.delete_existing_signature_files(destination, name) {
            tracing::warn!(name, "some files of the previous signature could not be removed");
        }
        Ok(archive)
    }

    /// Run the pipeline over HTML that is already on hand and install it as
    /// `name` in `destination`.
    pub fn process_document(
        &self,
        document: &SignatureDocument,
        destination: &Path,
        name: &str,
        options: ConversionOptions,
    ) -> Result<(SignatureBundle, String, Vec<AssetReference>)> {
        let inlined = inline_css(&document.html);
        let normalized = normalize(&inlined, options.fix_table_borders);

        let assets_folder = destination.join(format!("{}_files", name));
        let processed = assets::process_images(
            &normalized,
            &document.source_path,
            &assets_folder,
            name,
            options.asset_options(),
        )?;

        let mut bundle = installer::install(destination, name, &processed.html, &processed.plain_text)?;
        bundle.assets_folder_path = if remove_if_empty(&assets_folder) {
            None
        } else {
            Some(assets_folder)
        };

        Ok((bundle, processed.html, processed.assets))
    }

    /// Fail unless `source` is a file and `destination` accepts writes.
    ///
    /// Callers that replace an existing signature run this before
    /// [`prepare_destination`](Self::prepare_destination) deletes anything.
    pub fn check_preconditions(&self, source: &Path, destination: &Path) -> Result<()> {
        if !source.is_file() {
            bail!("Source document not found: {}", source.display());
        }
        if !self.repository.can_write_to_folder(destination) {
            bail!("Destination folder is not writable: {}", destination.display());
        }
        Ok(())
    }

    /// Convert `source` with the external converter and install the result.
    pub fn convert_document(
        &self,
        source: &Path,
        destination: &Path,
        name: &str,
        options: ConversionOptions,
    ) -> Result<ConversionOutcome> {
        self.check_preconditions(source, destination)?;

        let _span = tracing::info_span!("convert", signature = name).entered();

        let output = self
            .converter
            .convert_to_html_rtf_text(source, destination, name)
            .with_context(|| format!("Failed to convert {}", source.display()))?;

        let html = read_to_string_with_retry(&output.html_path, &self.read_policy)
            .with_context(|| format!("Failed to read {}", output.html_path.display()))?;

        let document = SignatureDocument {
            html,
            source_path: output.html_path.clone(),
        };
        let (bundle, normalized, assets) =
            self.process_document(&document, destination, name, options)?;

        let legacy_assets = destination.join(format!("{}_file", name));
        if legacy_assets.is_dir() && destination.join(format!("{}_files", name)).is_dir() {
            if let Err(e) = fs::remove_dir_all(&legacy_assets) {
                tracing::warn!(path = %legacy_assets.display(), error = %e, "cannot remove duplicate assets folder");
            }
        }

        let rtf_path = Some(output.rtf_path).filter(|p| p.is_file());
        tracing::info!(html = %bundle.html_path.display(), assets = assets.len(), "conversion complete");

        Ok(ConversionOutcome {
            bundle,
            rtf_path,
            normalized,
            assets,
        })
    }
}

/// Absolute, `.`/`..`-free, separator-trimmed, lowercase form for equality
/// checks.
fn comparable_path(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut resolved = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other.as_os_str()),
        }
    }
    resolved
        .to_string_lossy()
        .trim_end_matches(['/', '\\'])
        .to_lowercase()
}

/// Remove `folder` if it has no entries. Returns whether it is gone.
fn remove_if_empty(folder: &Path) -> bool {
    match fs::read_dir(folder) {
        Ok(mut entries) => {
            if entries.next().is_some() {
                return false;
            }
            match fs::remove_dir(folder) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(path = %folder.display(), error = %e, "cannot remove empty assets folder");
                    false
                }
            }
        }
        Err(_) => true,
    }
}
