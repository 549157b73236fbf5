//! Implementations of the `sigforge` subcommands.
//!
//! Each `run_*` function loads what it needs from [`Config`], performs one
//! command and prints its result to stdout. Diagnostics go through
//! `tracing` to stderr.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::config::Config;
use crate::converter::SofficeConverter;
use crate::editor::{is_unc_path, EditorSessionManager};
use crate::models::{BackupArchive, SignatureBundle, SignatureDocument};
use crate::presets::load_presets;
use crate::repository::SignatureRepository;
use crate::retry::{read_to_string_with_retry, RetryPolicy};
use crate::watch::EditorMonitor;
use crate::workflow::{ConversionOptions, SignatureWorkflow};

/// Where and how one signature is installed.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub name: String,
    pub identifier: Option<String>,
    pub dest: Option<PathBuf>,
    pub overwrite: bool,
    pub backup: bool,
    pub options: ConversionOptions,
}

pub fn repository(config: &Config) -> SignatureRepository {
    SignatureRepository::new(
        config.paths.signatures_dir.clone(),
        config.paths.output_dir.clone(),
    )
}

pub fn workflow(config: &Config) -> SignatureWorkflow {
    SignatureWorkflow::new(
        repository(config),
        Box::new(
            SofficeConverter::new(config.converter.program.clone())
                .with_cleanup(config.cleanup.max_retries, config.cleanup.base_delay()),
        ),
    )
}

fn session_manager(config: &Config) -> EditorSessionManager {
    EditorSessionManager::new(
        config.paths.editor_temp_dir.clone(),
        config.cleanup.max_retries,
        config.cleanup.editor_base_delay(),
    )
}

fn destination(config: &Config, request: &InstallRequest) -> PathBuf {
    request
        .dest
        .clone()
        .unwrap_or_else(|| config.paths.signatures_dir.clone())
}

fn print_bundle(name: &str, bundle: &SignatureBundle, backup: Option<&BackupArchive>) {
    if let Some(backup) = backup {
        println!("Backup:    {}", backup.full_path.display());
    }
    println!("Signature: {}", name);
    println!("  html:    {}", bundle.html_path.display());
    println!("  text:    {}", bundle.text_path.display());
    if let Some(assets) = &bundle.assets_folder_path {
        println!("  assets:  {}", assets.display());
    }
}

/// Convert an office document and install it as a signature.
pub fn run_convert(config: &Config, source: &Path, request: &InstallRequest) -> Result<()> {
    let wf = workflow(config);
    let name = wf.build_final_signature_name(&request.name, request.identifier.as_deref());
    let dest = destination(config, request);

    wf.check_preconditions(source, &dest)?;
    let backup = wf.prepare_destination(&dest, &name, request.overwrite, request.backup)?;
    let outcome = wf.convert_document(source, &dest, &name, request.options)?;

    print_bundle(&name, &outcome.bundle, backup.as_ref());
    if let Some(rtf) = &outcome.rtf_path {
        println!("  rtf:     {}", rtf.display());
    }
    Ok(())
}

/// Run the pipeline over an existing HTML file and install the result.
pub fn run_normalize(config: &Config, html_path: &Path, request: &InstallRequest) -> Result<()> {
    let wf = workflow(config);
    let name = wf.build_final_signature_name(&request.name, request.identifier.as_deref());
    let dest = destination(config, request);

    let html = read_to_string_with_retry(html_path, &RetryPolicy::default())
        .with_context(|| format!("Failed to read {}", html_path.display()))?;
    if !wf.repository().can_write_to_folder(&dest) {
        bail!("Destination folder is not writable: {}", dest.display());
    }

    let backup = wf.prepare_destination(&dest, &name, request.overwrite, request.backup)?;
    let document = SignatureDocument {
        html,
        source_path: html_path.to_path_buf(),
    };
    let (bundle, _, _) = wf.process_document(&document, &dest, &name, request.options)?;

    print_bundle(&name, &bundle, backup.as_ref());
    Ok(())
}

pub fn run_list(config: &Config, dir: Option<&Path>, json: bool) -> Result<()> {
    let folder = dir.unwrap_or(config.paths.signatures_dir.as_path());
    let signatures = repository(config).get_signatures(folder);

    if json {
        println!("{}", serde_json::to_string_pretty(&signatures)?);
        return Ok(());
    }

    if signatures.is_empty() {
        println!("No signatures in {}", folder.display());
        return Ok(());
    }
    for signature in &signatures {
        println!("{}", signature.display_info());
    }
    Ok(())
}

pub fn run_delete(config: &Config, name: &str, dir: Option<&Path>) -> Result<()> {
    let folder = dir.unwrap_or(config.paths.signatures_dir.as_path());
    let repo = repository(config);
    let Some(signature) = repo
        .get_signatures(folder)
        .into_iter()
        .find(|s| s.name.eq_ignore_ascii_case(name))
    else {
        bail!("Signature '{}' not found in {}", name, folder.display());
    };

    if !repo.delete_signature(&signature) {
        bail!("Some files of '{}' could not be deleted", signature.name);
    }
    println!("Deleted {}", signature.name);
    Ok(())
}

pub fn run_backup_create(config: &Config) -> Result<()> {
    match repository(config).create_backup() {
        Some(backup) => println!("{}", backup.display_info()),
        None => println!(
            "Nothing backed up from {}",
            config.paths.signatures_dir.display()
        ),
    }
    Ok(())
}

pub fn run_backup_list(config: &Config, json: bool) -> Result<()> {
    let backups = repository(config).list_backups(&config.paths.signatures_dir);
    if json {
        println!("{}", serde_json::to_string_pretty(&backups)?);
        return Ok(());
    }
    if backups.is_empty() {
        println!("No backups");
    }
    for backup in &backups {
        println!("{}", backup.display_info());
    }
    Ok(())
}

fn find_backup(repo: &SignatureRepository, folder: &Path, file: &str) -> Result<BackupArchive> {
    repo.list_backups(folder)
        .into_iter()
        .find(|b| b.file_name == file)
        .with_context(|| format!("Backup '{}' not found in {}", file, folder.display()))
}

pub fn run_backup_restore(config: &Config, file: &str, dest: Option<&Path>) -> Result<()> {
    let repo = repository(config);
    let backup = find_backup(&repo, &config.paths.signatures_dir, file)?;
    let dest = dest.unwrap_or(config.paths.signatures_dir.as_path());
    if !repo.restore_backup(&backup, dest) {
        bail!("Failed to restore {}", backup.file_name);
    }
    println!("Restored {} into {}", backup.file_name, dest.display());
    Ok(())
}

pub fn run_backup_delete(config: &Config, file: &str) -> Result<()> {
    let repo = repository(config);
    let backup = find_backup(&repo, &config.paths.signatures_dir, file)?;
    if !repo.delete_backup(&backup) {
        bail!("Failed to delete {}", backup.file_name);
    }
    println!("Deleted {}", backup.file_name);
    Ok(())
}

/// Stage `source`, open it in the editor, wait for save + close, convert.
pub fn run_edit(
    config: &Config,
    source: &Path,
    request: &InstallRequest,
    timeout: Option<Duration>,
) -> Result<()> {
    let manager = session_manager(config);
    manager.cleanup_orphaned(config.cleanup.orphan_max_age(), None);

    if is_unc_path(source) {
        tracing::info!(source = %source.display(), "network document, editing a local copy");
    }

    let wf = workflow(config);
    let name = wf.build_final_signature_name(&request.name, request.identifier.as_deref());
    let mut session = manager.prepare_for_editing(source, &name)?;

    let result = edit_and_convert(config, &manager, &wf, &mut session, request, timeout);
    manager.cleanup_session(session.session_id);
    result
}

fn edit_and_convert(
    config: &Config,
    manager: &EditorSessionManager,
    wf: &SignatureWorkflow,
    session: &mut crate::models::EditorSession,
    request: &InstallRequest,
    timeout: Option<Duration>,
) -> Result<()> {
    let mut monitor = EditorMonitor::new(session, config.editor.poll_interval())?;

    let program = config
        .editor
        .command
        .clone()
        .unwrap_or_else(|| config.converter.program.clone());
    let child = Command::new(&program)
        .arg(&session.local_file_path)
        .spawn()
        .with_context(|| format!("Failed to launch editor '{}'", program))?;
    monitor.attach_editor(child);
    println!(
        "Editing {} (save and close the document to continue)",
        session.local_file_path.display()
    );

    let closed = monitor.wait_until_closed(session, timeout);
    if !manager.validate(session) {
        bail!("The staged document is no longer available");
    }
    if !session.is_ready_for_conversion() {
        bail!(
            "Document is {}; nothing was converted",
            session.status()
        );
    }
    if !closed {
        tracing::warn!("editor still open, converting the last saved version");
    }

    let dest = destination(config, request);
    wf.check_preconditions(&session.local_file_path, &dest)?;
    let backup = wf.prepare_destination(
        &dest,
        &session.proposed_signature_name,
        request.overwrite,
        request.backup,
    )?;
    let outcome = wf.convert_document(
        &session.local_file_path,
        &dest,
        &session.proposed_signature_name,
        request.options,
    )?;
    print_bundle(&session.proposed_signature_name, &outcome.bundle, backup.as_ref());
    Ok(())
}

pub fn run_cleanup(config: &Config) -> Result<()> {
    let removed = session_manager(config).cleanup_all();
    println!("Removed {} editor session folder(s)", removed);
    Ok(())
}

pub fn run_presets(config: &Config) -> Result<()> {
    let presets = load_presets(&config.paths.presets_dir);
    if presets.is_empty() {
        println!("No presets in {}", config.paths.presets_dir.display());
    }
    for preset in &presets {
        println!("{:<32} {}", preset.display_name, preset.full_path.display());
    }
    Ok(())
}
