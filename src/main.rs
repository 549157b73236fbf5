//! # sigforge CLI
//!
//! Converts office documents into email signature bundles and manages the
//! signatures folder the mail client reads from.
//!
//! ## Usage
//!
//! ```bash
//! sigforge --config ./config/sigforge.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sigforge convert <doc> --name N` | Convert a document and install it as a signature |
//! | `sigforge normalize <html> --name N` | Install an existing HTML file as a signature |
//! | `sigforge list` | List signatures in the signatures folder |
//! | `sigforge delete <name>` | Delete a signature and its assets |
//! | `sigforge backup create\|list\|restore\|delete` | Manage zip backups |
//! | `sigforge edit <doc> --name N` | Edit a local copy, then convert it |
//! | `sigforge cleanup` | Remove editor staging folders |
//! | `sigforge presets` | List bundled document templates |
//!
//! ## Examples
//!
//! ```bash
//! # Convert and install into the default signatures folder
//! sigforge convert ./firma.docx --name "Mario Rossi" --identifier mario@example.com
//!
//! # Replace an existing signature, keeping a backup of the folder
//! sigforge convert ./firma.docx --name "Mario Rossi" --overwrite
//!
//! # Produce a bundle elsewhere with linked rather than embedded images
//! sigforge convert ./firma.docx --name Firma --dest ./out --link-images
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use sigforge::commands::{self, InstallRequest};
use sigforge::config::{self, Config};

/// sigforge: email signature bundles from office documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Without it, `./config/sigforge.toml` is used when present.
#[derive(Parser)]
#[command(
    name = "sigforge",
    about = "sigforge: build portable email signature bundles from office documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a document with the office suite and install it.
    Convert {
        /// The `.doc`, `.docx` or `.rtf` document.
        source: PathBuf,

        #[command(flatten)]
        install: InstallArgs,
    },

    /// Run the cleanup pipeline over an HTML file and install it.
    Normalize {
        /// HTML file; relative image references resolve against its folder.
        html: PathBuf,

        #[command(flatten)]
        install: InstallArgs,
    },

    /// List signatures.
    List {
        /// Folder to list instead of the signatures folder.
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Print JSON instead of one line per signature.
        #[arg(long)]
        json: bool,
    },

    /// Delete a signature and its asset folders.
    Delete {
        name: String,

        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Manage backups of the signatures folder.
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },

    /// Open a local copy of a document for editing, then convert it once it
    /// has been saved and closed.
    Edit {
        source: PathBuf,

        #[command(flatten)]
        install: InstallArgs,

        /// Give up waiting for the editor after this many seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Remove all editor staging folders.
    Cleanup,

    /// List bundled document templates.
    Presets,
}

#[derive(Subcommand)]
enum BackupAction {
    /// Archive the signatures folder now.
    Create,
    /// List archives, newest first.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Extract an archive, overwriting existing files.
    Restore {
        /// Archive file name as shown by `backup list`.
        file: String,

        /// Extract here instead of the signatures folder.
        #[arg(long)]
        dest: Option<PathBuf>,
    },
    /// Delete an archive.
    Delete { file: String },
}

/// Options shared by every command that installs a signature.
#[derive(Args)]
struct InstallArgs {
    /// Signature name; invalid file name characters are replaced.
    #[arg(long)]
    name: String,

    /// Appended as `"Name (identifier)"`, typically the mail address.
    #[arg(long)]
    identifier: Option<String>,

    /// Destination folder (defaults to the signatures folder).
    #[arg(long)]
    dest: Option<PathBuf>,

    /// Replace an existing signature with the same name.
    #[arg(long)]
    overwrite: bool,

    /// Keep visible table borders.
    #[arg(long)]
    no_table_fix: bool,

    /// Copy images into the assets folder instead of embedding them.
    #[arg(long)]
    link_images: bool,

    /// Reference copied images by absolute path.
    #[arg(long)]
    absolute_paths: bool,

    /// Skip the backup normally taken before overwriting.
    #[arg(long)]
    no_backup: bool,
}

impl InstallArgs {
    fn into_request(self, cfg: &Config) -> InstallRequest {
        let mut options = cfg.conversion.options();
        if self.no_table_fix {
            options.fix_table_borders = false;
        }
        if self.link_images {
            options.embed_images = false;
        }
        if self.absolute_paths {
            options.use_absolute_paths = true;
        }
        InstallRequest {
            name: self.name,
            identifier: self.identifier,
            dest: self.dest,
            overwrite: self.overwrite,
            backup: !self.no_backup,
            options,
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cfg = config::resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Convert { source, install } => {
            let request = install.into_request(&cfg);
            commands::run_convert(&cfg, &source, &request)?;
        }
        Commands::Normalize { html, install } => {
            let request = install.into_request(&cfg);
            commands::run_normalize(&cfg, &html, &request)?;
        }
        Commands::List { dir, json } => {
            commands::run_list(&cfg, dir.as_deref(), json)?;
        }
        Commands::Delete { name, dir } => {
            commands::run_delete(&cfg, &name, dir.as_deref())?;
        }
        Commands::Backup { action } => match action {
            BackupAction::Create => commands::run_backup_create(&cfg)?,
            BackupAction::List { json } => commands::run_backup_list(&cfg, json)?,
            BackupAction::Restore { file, dest } => {
                commands::run_backup_restore(&cfg, &file, dest.as_deref())?
            }
            BackupAction::Delete { file } => commands::run_backup_delete(&cfg, &file)?,
        },
        Commands::Edit {
            source,
            install,
            timeout_secs,
        } => {
            let request = install.into_request(&cfg);
            commands::run_edit(
                &cfg,
                &source,
                &request,
                timeout_secs.map(Duration::from_secs),
            )?;
        }
        Commands::Cleanup => {
            commands::run_cleanup(&cfg)?;
        }
        Commands::Presets => {
            commands::run_presets(&cfg)?;
        }
    }

    Ok(())
}
