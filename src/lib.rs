//! # sigforge
//!
//! Turns office documents into portable email signature bundles: an `.htm`
//! file, a plain-text `.txt` fallback and an optional folder of
//! content-addressed images, installed where the mail client reads them.
//!
//! The document itself is converted by an external office suite. What this
//! crate owns is everything after that: cleaning vendor markup, inlining
//! CSS, resolving images, deriving the plain text and installing the result
//! safely next to files an editor may still hold open.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌────────────────────────────────────┐   ┌────────────┐
//! │ converter │──▶│ inliner ▶ normalize ▶ assets ▶ text │──▶│ installer  │
//! │ (soffice) │   └────────────────────────────────────┘   └─────┬──────┘
//! └───────────┘                                                  │
//!       ▲                                                        ▼
//! ┌─────┴─────┐   ┌───────────┐                           ┌────────────┐
//! │  editor   │◀──│   watch   │                           │ repository │
//! │ sessions  │   │ lock+poll │                           │  backups   │
//! └───────────┘   └───────────┘                           └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`dom`] | HTML tree helpers over html5ever |
//! | [`inliner`] | CSS inlining with a lossy fallback |
//! | [`normalize`] | Vendor markup cleanup and the table border fix |
//! | [`assets`] | Image resolution, embedding and copying |
//! | [`plain_text`] | Plain-text rendition |
//! | [`content_address`] | Hash-derived asset names and MIME mapping |
//! | [`installer`] | Final `.htm`/`.txt` write |
//! | [`cleanup`] | Retried removal of temporary folders |
//! | [`retry`] | Bounded retry with backoff |
//! | [`encoding`] | Charset detection for converter HTML |
//! | [`naming`] | Signature name sanitization |
//! | [`repository`] | Signature listing, deletion and zip backups |
//! | [`converter`] | Office suite boundary |
//! | [`workflow`] | Conversion orchestration |
//! | [`editor`] | Editing sessions on local copies |
//! | [`watch`] | Editor save/close detection |
//! | [`presets`] | Bundled document templates |
//! | [`commands`] | CLI command implementations |

pub mod assets;
pub mod cleanup;
pub mod commands;
pub mod config;
pub mod content_address;
pub mod converter;
pub mod dom;
pub mod editor;
pub mod encoding;
pub mod inliner;
pub mod installer;
pub mod models;
pub mod naming;
pub mod normalize;
pub mod plain_text;
pub mod presets;
pub mod repository;
pub mod retry;
pub mod watch;
pub mod workflow;
