//! Boundary to the external word processor.
//!
//! The normalization pipeline never talks to the office suite directly: it
//! receives the files a [`DocumentConverter`] left on disk. The shipped
//! implementation drives LibreOffice in headless mode.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use thiserror::Error;

use crate::cleanup;
use crate::models::ConversionOutput;

#[derive(Debug, Error)]
pub enum ConverterError {
    #[error("source document not found: {0}")]
    SourceNotFound(PathBuf),
    #[error("converter '{program}' is not available: {reason}")]
    Unavailable { program: String, reason: String },
    #[error("{step} conversion failed: {message}")]
    Failed { step: String, message: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Produces the HTML, RTF and plain-text renditions of a document.
pub trait DocumentConverter {
    /// Write `{base_name}.htm`, `.rtf` and `.txt` into `dest_folder`.
    fn convert_to_html_rtf_text(
        &self,
        source: &Path,
        dest_folder: &Path,
        base_name: &str,
    ) -> Result<ConversionOutput, ConverterError>;
}

/// One `--convert-to` run of the office suite.
struct ExportStep {
    label: &'static str,
    filter: &'static str,
    /// Extension the suite gives the output file.
    produced: &'static str,
    /// Extension of the file left in the destination folder.
    installed: &'static str,
}

const EXPORT_STEPS: &[ExportStep] = &[
    ExportStep {
        label: "HTML",
        filter: "html:HTML (StarWriter):EmbedImages",
        produced: "html",
        installed: "htm",
    },
    ExportStep {
        label: "RTF",
        filter: "rtf",
        produced: "rtf",
        installed: "rtf",
    },
    ExportStep {
        label: "TXT",
        filter: "txt:Text (encoded):UTF8",
        produced: "txt",
        installed: "txt",
    },
];

/// Converts documents with `soffice --headless --convert-to`.
#[derive(Debug, Clone)]
pub struct SofficeConverter {
    program: String,
    cleanup_retries: u32,
    cleanup_base_delay: Duration,
}

impl SofficeConverter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            cleanup_retries: cleanup::DEFAULT_MAX_RETRIES,
            cleanup_base_delay: cleanup::DEFAULT_BASE_DELAY,
        }
    }

    /// Retry settings for removing the staging folder.
    pub fn with_cleanup(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.cleanup_retries = max_retries;
        self.cleanup_base_delay = base_delay;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn run_step(&self, step: &ExportStep, input: &Path, outdir: &Path) -> Result<(), ConverterError> {
        tracing::debug!(program = %self.program, step = step.label, "running converter");
        let output = Command::new(&self.program)
            .arg("--headless")
            .arg("--norestore")
            .arg("--convert-to")
            .arg(step.filter)
            .arg("--outdir")
            .arg(outdir)
            .arg(input)
            .output()
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    ConverterError::Unavailable {
                        program: self.program.clone(),
                        reason: e.to_string(),
                    }
                } else {
                    ConverterError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(ConverterError::Failed {
                step: step.label.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn convert_in(
        &self,
        staging: &Path,
        source: &Path,
        dest_folder: &Path,
        base_name: &str,
    ) -> Result<ConversionOutput, ConverterError> {
        fs::create_dir_all(staging)?;

        let staged_name = match source.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}.{}", base_name, ext),
            None => base_name.to_string(),
        };
        let staged = staging.join(staged_name);
        fs::copy(source, &staged)?;
        cleanup::clear_readonly(&staged);

        let mut installed = Vec::with_capacity(EXPORT_STEPS.len());
        for step in EXPORT_STEPS {
            self.run_step(step, &staged, staging)?;
            let produced = staging.join(format!("{}.{}", base_name, step.produced));
            if !produced.is_file() {
                return Err(ConverterError::Failed {
                    step: step.label.to_string(),
                    message: format!("expected output {} was not produced", produced.display()),
                });
            }
            let target = dest_folder.join(format!("{}.{}", base_name, step.installed));
            move_file(&produced, &target)?;
            installed.push(target);
        }

        let txt_path = installed.pop().unwrap_or_default();
        let rtf_path = installed.pop().unwrap_or_default();
        let html_path = installed.pop().unwrap_or_default();

        let assets_folder_path = ["_files", "_file"]
            .iter()
            .map(|suffix| dest_folder.join(format!("{}{}", base_name, suffix)))
            .find(|p| p.is_dir());

        Ok(ConversionOutput {
            html_path,
            rtf_path,
            txt_path,
            assets_folder_path,
        })
    }
}

impl DocumentConverter for SofficeConverter {
    fn convert_to_html_rtf_text(
        &self,
        source: &Path,
        dest_folder: &Path,
        base_name: &str,
    ) -> Result<ConversionOutput, ConverterError> {
        if !source.is_file() {
            return Err(ConverterError::SourceNotFound(source.to_path_buf()));
        }
        fs::create_dir_all(dest_folder)?;

        let staging = dest_folder.join(format!(".{}_conversion_{}", base_name, uuid::Uuid::new_v4()));
        let result = self.convert_in(&staging, source, dest_folder, base_name);
        cleanup::cleanup_directory_with_retries(
            &staging,
            "converter staging",
            self.cleanup_retries,
            self.cleanup_base_delay,
        );

        match &result {
            Ok(out) => tracing::info!(
                source = %source.display(),
                html = %out.html_path.display(),
                "document converted"
            ),
            Err(e) => tracing::warn!(source = %source.display(), error = %e, "conversion failed"),
        }
        result
    }
}

/// Rename, falling back to copy + delete across filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        fs::remove_file(to)?;
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}
