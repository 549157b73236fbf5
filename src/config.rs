use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::workflow::ConversionOptions;

/// Config file read when `--config` is not given, if it exists.
pub const DEFAULT_CONFIG_PATH: &str = "./config/sigforge.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub conversion: ConversionConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub editor: EditorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_signatures_dir")]
    pub signatures_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_editor_temp_dir")]
    pub editor_temp_dir: PathBuf,
    #[serde(default = "default_presets_dir")]
    pub presets_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            signatures_dir: default_signatures_dir(),
            output_dir: default_output_dir(),
            editor_temp_dir: default_editor_temp_dir(),
            presets_dir: default_presets_dir(),
        }
    }
}

/// The folder Outlook reads signatures from.
fn default_signatures_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Microsoft")
        .join("Signatures")
}

fn default_output_dir() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sigforge")
        .join("Output")
}

fn default_editor_temp_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("sigforge")
        .join("EditorTemp")
}

fn default_presets_dir() -> PathBuf {
    PathBuf::from("./media")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConversionConfig {
    #[serde(default = "default_true")]
    pub fix_table_borders: bool,
    #[serde(default = "default_true")]
    pub embed_images: bool,
    #[serde(default)]
    pub use_absolute_paths: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            fix_table_borders: true,
            embed_images: true,
            use_absolute_paths: false,
        }
    }
}

impl ConversionConfig {
    pub fn options(&self) -> ConversionOptions {
        ConversionOptions {
            fix_table_borders: self.fix_table_borders,
            embed_images: self.embed_images,
            use_absolute_paths: self.use_absolute_paths,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct CleanupConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_editor_base_delay_ms")]
    pub editor_base_delay_ms: u64,
    #[serde(default = "default_orphan_max_age_hours")]
    pub orphan_max_age_hours: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            editor_base_delay_ms: default_editor_base_delay_ms(),
            orphan_max_age_hours: default_orphan_max_age_hours(),
        }
    }
}

impl CleanupConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn editor_base_delay(&self) -> Duration {
        Duration::from_millis(self.editor_base_delay_ms)
    }

    pub fn orphan_max_age(&self) -> Duration {
        Duration::from_secs(self.orphan_max_age_hours.saturating_mul(3600))
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    100
}
fn default_editor_base_delay_ms() -> u64 {
    200
}
fn default_orphan_max_age_hours() -> u64 {
    24
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConverterConfig {
    #[serde(default = "default_program")]
    pub program: String,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
        }
    }
}

fn default_program() -> String {
    "soffice".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EditorConfig {
    /// Program that opens staged documents; the office suite when unset.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            command: None,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl EditorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_poll_interval_ms() -> u64 {
    2000
}

impl Config {
    /// Defaults with every folder placed under `root`; used by tests.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            paths: PathsConfig {
                signatures_dir: root.join("Signatures"),
                output_dir: root.join("Output"),
                editor_temp_dir: root.join("EditorTemp"),
                presets_dir: root.join("media"),
            },
            ..Self::default()
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    validate(&config)?;
    Ok(config)
}

/// Load `path` if given, else the default file when present, else defaults.
pub fn resolve_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => load_config(p),
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                load_config(default)
            } else {
                Ok(Config::default())
            }
        }
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.cleanup.max_retries < 1 {
        anyhow::bail!("cleanup.max_retries must be >= 1");
    }

    if config.editor.poll_interval_ms == 0 {
        anyhow::bail!("editor.poll_interval_ms must be > 0");
    }

    if config.converter.program.trim().is_empty() {
        anyhow::bail!("converter.program must not be empty");
    }

    Ok(())
}
