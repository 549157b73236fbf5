//! Image reference resolution.
//!
//! Scans signature HTML for `<img src>`, VML `<v:imagedata src>` and the
//! `o:href` / `v:href` / `xlink:href` linked-resource attributes, then either
//! embeds each local image as a `data:` URI or copies it into the signature's
//! assets folder under a content-addressed name. Remote (`http(s):`) and
//! `cid:` references are left for the mail client.
//!
//! This is the only stage that writes asset bytes. Every write is
//! content-addressed, so reprocessing the same input is a no-op on disk.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use markup5ever_rcdom::Handle;
use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::content_address::{
    content_address, content_hash, extension_from_mime, mime_from_extension, path_extension,
};
use crate::dom;
use crate::models::AssetReference;
use crate::plain_text::build_plain_text;

const LINKED_RESOURCE_ATTRIBUTES: &[&str] = &["o:href", "v:href", "xlink:href"];

/// How resolved images are written back into the HTML.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetOptions {
    /// Rewrite copied images to absolute paths instead of `folder/name`.
    pub use_absolute_paths: bool,
    /// Inline local images as `data:` URIs instead of copying them.
    pub embed_images: bool,
}

#[derive(Debug, Clone)]
pub struct AssetProcessingResult {
    pub html: String,
    pub plain_text: String,
    /// Files written to (or already present in) the assets folder.
    pub assets: Vec<AssetReference>,
}

/// Resolve every image reference in `html` and return the rewritten markup
/// with its plain-text rendition.
///
/// Relative references resolve against the directory of `source_html_path`.
/// Unresolvable or malformed references are logged and left as they are.
pub fn process_images(
    html: &str,
    source_html_path: &Path,
    assets_folder: &Path,
    signature_name: &str,
    options: AssetOptions,
) -> Result<AssetProcessingResult> {
    fs::create_dir_all(assets_folder).with_context(|| {
        format!("Failed to create assets folder: {}", assets_folder.display())
    })?;

    let _span = tracing::info_span!("process_images", signature = signature_name).entered();

    let doc = dom::parse(html);
    let body = dom::body(&doc);
    let elements = dom::elements(&body);

    let mut resolver = AssetResolver {
        base_dir: source_html_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
        assets_folder,
        assets_folder_name: assets_folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        options,
        path_map: HashMap::new(),
        assets: Vec::new(),
    };

    for image in elements.iter().filter(|n| dom::is_element(n, "img")) {
        resolver.process_attribute(image, "src");
    }
    for image in elements.iter().filter(|n| dom::is_element(n, "v:imagedata")) {
        resolver.process_attribute(image, "src");
    }
    for node in &elements {
        for attr in LINKED_RESOURCE_ATTRIBUTES {
            if dom::has_attr(node, attr) {
                resolver.process_attribute(node, attr);
            }
        }
    }

    let html = dom::inner_html(&body);
    let plain_text = build_plain_text(&html);
    Ok(AssetProcessingResult {
        html,
        plain_text,
        assets: resolver.assets,
    })
}

struct AssetResolver<'a> {
    base_dir: PathBuf,
    assets_folder: &'a Path,
    assets_folder_name: String,
    options: AssetOptions,
    /// Resolved source path → target file name; each source is copied once.
    path_map: HashMap<PathBuf, String>,
    assets: Vec<AssetReference>,
}

impl AssetResolver<'_> {
    fn process_attribute(&mut self, node: &Handle, attr: &str) {
        let Some(src) = dom::get_attr(node, attr) else {
            return;
        };
        let src = src.trim();
        if src.is_empty() || is_client_resolved(src) {
            return;
        }

        if has_scheme(src, "data:") {
            if !self.options.embed_images {
                if let Some(rewritten) = self.save_data_uri(src) {
                    dom::set_attr(node, attr, &rewritten);
                }
            }
            return;
        }

        let Some(resolved) = locate_image(src, &self.base_dir) else {
            tracing::warn!(src, "image not found");
            return;
        };

        if self.options.embed_images {
            match to_data_uri(&resolved) {
                Ok(data_uri) => {
                    dom::set_attr(node, attr, &data_uri);
                    tracing::info!(file = %resolved.display(), "image embedded");
                }
                Err(e) => tracing::warn!(file = %resolved.display(), error = %e, "could not embed image"),
            }
            return;
        }

        let file_name = match self.path_map.get(&resolved).cloned() {
            Some(name) => name,
            None => match self.copy_asset(src, &resolved) {
                Ok(name) => {
                    self.path_map.insert(resolved.clone(), name.clone());
                    name
                }
                Err(e) => {
                    tracing::warn!(file = %resolved.display(), error = %e, "could not copy image");
                    return;
                }
            },
        };

        dom::set_attr(node, attr, &self.rewritten_reference(&file_name));
    }

    fn copy_asset(&mut self, src: &str, resolved: &Path) -> Result<String> {
        let bytes = fs::read(resolved)?;
        let file_name = content_address(&bytes, &path_extension(resolved));
        let destination = self.assets_folder.join(&file_name);
        if !destination.exists() {
            fs::copy(resolved, &destination)?;
            tracing::debug!(from = %resolved.display(), to = %destination.display(), "image copied");
        }
        self.assets.push(AssetReference {
            original_src: src.to_string(),
            resolved_source_path: Some(resolved.to_path_buf()),
            content_hash: content_hash(&bytes),
            target_file_name: file_name.clone(),
        });
        Ok(file_name)
    }

    /// Decode a base64 `data:` URI into the assets folder.
    fn save_data_uri(&mut self, src: &str) -> Option<String> {
        let (mime, bytes) = decode_data_uri(src)?;
        let file_name = content_address(&bytes, extension_from_mime(&mime));
        let destination = self.assets_folder.join(&file_name);
        if !destination.exists() {
            if let Err(e) = fs::write(&destination, &bytes) {
                tracing::warn!(file = %destination.display(), error = %e, "could not save embedded image");
                return None;
            }
        }
        self.assets.push(AssetReference {
            original_src: abbreviate(src),
            resolved_source_path: None,
            content_hash: content_hash(&bytes),
            target_file_name: file_name.clone(),
        });
        Some(self.rewritten_reference(&file_name))
    }

    fn rewritten_reference(&self, file_name: &str) -> String {
        if self.options.use_absolute_paths {
            self.assets_folder.join(file_name).to_string_lossy().into_owned()
        } else {
            format!("{}/{}", self.assets_folder_name, file_name)
        }
    }
}

fn has_scheme(value: &str, scheme: &str) -> bool {
    value.len() >= scheme.len()
        && value.as_bytes()[..scheme.len()].eq_ignore_ascii_case(scheme.as_bytes())
}

/// References the mail client resolves at render time.
fn is_client_resolved(src: &str) -> bool {
    has_scheme(src, "cid:") || has_scheme(src, "http://") || has_scheme(src, "https://")
}

/// Split a base64 data URI into its MIME type and decoded bytes.
fn decode_data_uri(src: &str) -> Option<(String, Vec<u8>)> {
    const MARKER: &str = "base64,";
    let Some(marker_at) = src.to_ascii_lowercase().find(MARKER) else {
        tracing::warn!("unsupported data URI (not base64)");
        return None;
    };
    let meta = src["data:".len()..marker_at].trim_end_matches(';');
    let mime = meta.split(';').next().unwrap_or_default().trim().to_string();
    let payload: String = src[marker_at + MARKER.len()..]
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    match STANDARD.decode(payload) {
        Ok(bytes) => Some((mime, bytes)),
        Err(e) => {
            tracing::warn!(error = %e, "could not decode embedded image");
            None
        }
    }
}

/// Resolve `src` to an existing file: `file:` URIs, absolute paths, then
/// paths relative to `base_dir`. Percent-encoded names are retried decoded.
fn locate_image(src: &str, base_dir: &Path) -> Option<PathBuf> {
    if has_scheme(src, "file:") {
        return url::Url::parse(src)
            .ok()
            .and_then(|u| u.to_file_path().ok())
            .filter(|p| p.is_file());
    }

    let candidate = resolve_path(src, base_dir);
    if candidate.is_file() {
        return Some(candidate);
    }

    let decoded = percent_decode_str(src).decode_utf8().ok()?;
    if decoded != src {
        let candidate = resolve_path(&decoded, base_dir);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

fn resolve_path(src: &str, base_dir: &Path) -> PathBuf {
    let path = Path::new(src);
    if path.is_absolute() || src.starts_with('/') || src.starts_with('\\') {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn to_data_uri(path: &Path) -> std::io::Result<String> {
    let bytes = fs::read(path)?;
    let mime = mime_from_extension(&path_extension(path));
    Ok(format!("data:{};base64,{}", mime, STANDARD.encode(bytes)))
}

/// Data URIs can be megabytes long; keep only the header for the record.
fn abbreviate(src: &str) -> String {
    match src.find(',') {
        Some(comma) => format!("{},…", &src[..comma]),
        None => src.to_string(),
    }
}
