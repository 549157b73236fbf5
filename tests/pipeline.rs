use std::fs;
use std::path::Path;
use std::time::Duration;

use sigforge::cleanup::cleanup_directory_with_retries;
use sigforge::config::Config;
use sigforge::converter::{ConverterError, DocumentConverter};
use sigforge::models::ConversionOutput;
use sigforge::normalize::normalize;
use sigforge::plain_text::build_plain_text;
use sigforge::repository::SignatureRepository;
use sigforge::workflow::{ConversionOptions, SignatureWorkflow};
use tempfile::TempDir;

/// Mimics the office suite: HTML plus an image folder using the legacy
/// `_file` suffix next to it.
struct WordLikeConverter;

const WORD_HTML: &str = r#"<html xmlns:v="urn:schemas-microsoft-com:vml" xmlns:o="urn:schemas-microsoft-com:office:office">
<head><meta charset="utf-8"><style>
p.MsoNormal { margin: 0cm; font-family: "Calibri"; }
.accent { color: #1F497D; }
</style><!--[if gte mso 9]><xml><o:shapedefaults v:ext="edit"></o:shapedefaults></xml><![endif]--></head>
<body>
<p class="MsoNormal"><span class="accent" style="mso-fareast-language:IT">Mario Rossi</span><o:p></o:p></p>
<table border="1" cellpadding="5" style="border-collapse:collapse; border:none; mso-border-alt:solid windowtext .5pt">
<tr><td style="border:solid windowtext 1.0pt; padding:0cm 5.4pt"><img src="Firma_file/image001.png" width="80"></td>
<td><p class="MsoNormal">Via Roma 1<br>Milano</p></td></tr></table>
<p class="MsoNormal"><img src="Firma_file/image001.png" width="20"> <a href="https://example.com">example.com</a></p>
</body></html>"#;

impl DocumentConverter for WordLikeConverter {
    fn convert_to_html_rtf_text(
        &self,
        _source: &Path,
        dest_folder: &Path,
        base_name: &str,
    ) -> Result<ConversionOutput, ConverterError> {
        let assets = dest_folder.join(format!("{}_file", base_name));
        fs::create_dir_all(&assets)?;
        fs::write(assets.join("image001.png"), [0x89u8, b'P', b'N', b'G', 0, 1, 2, 3])?;

        let html_path = dest_folder.join(format!("{}.htm", base_name));
        let rtf_path = dest_folder.join(format!("{}.rtf", base_name));
        let txt_path = dest_folder.join(format!("{}.txt", base_name));
        fs::write(&html_path, WORD_HTML)?;
        fs::write(&rtf_path, "{\\rtf1 Mario Rossi}")?;
        fs::write(&txt_path, "Mario Rossi")?;
        Ok(ConversionOutput {
            html_path,
            rtf_path,
            txt_path,
            assets_folder_path: Some(assets),
        })
    }
}

fn setup() -> (TempDir, SignatureWorkflow, std::path::PathBuf) {
    let tmp = TempDir::new().unwrap();
    let config = Config::rooted_at(tmp.path());
    let repo = SignatureRepository::new(
        config.paths.signatures_dir.clone(),
        config.paths.output_dir.clone(),
    );
    let workflow = SignatureWorkflow::new(repo, Box::new(WordLikeConverter));
    let source = tmp.path().join("firma.docx");
    fs::write(&source, b"doc").unwrap();
    (tmp, workflow, source)
}

#[test]
fn linked_images_are_copied_once_and_legacy_folder_removed() {
    let (tmp, workflow, source) = setup();
    let dest = tmp.path().join("Output");
    let options = ConversionOptions {
        embed_images: false,
        ..ConversionOptions::default()
    };

    let outcome = workflow
        .convert_document(&source, &dest, "Firma", options)
        .unwrap();

    let assets_folder = dest.join("Firma_files");
    assert_eq!(outcome.bundle.assets_folder_path.as_deref(), Some(assets_folder.as_path()));
    let copied: Vec<_> = fs::read_dir(&assets_folder).unwrap().flatten().collect();
    assert_eq!(copied.len(), 1);
    let file_name = copied[0].file_name().to_string_lossy().into_owned();
    assert!(file_name.ends_with(".png"));
    assert_eq!(file_name.len(), 64 + ".png".len());

    let html = fs::read_to_string(&outcome.bundle.html_path).unwrap();
    let reference = format!("Firma_files/{}", file_name);
    assert_eq!(html.matches(&reference).count(), 2, "{}", html);
    assert!(html.contains("https://example.com"));
    assert!(!dest.join("Firma_file").exists());
}

#[test]
fn embedded_images_become_data_uris() {
    let (tmp, workflow, source) = setup();
    let dest = tmp.path().join("Output");

    let outcome = workflow
        .convert_document(&source, &dest, "Firma", ConversionOptions::default())
        .unwrap();

    assert!(outcome.assets.is_empty());
    assert!(outcome.bundle.assets_folder_path.is_none());
    assert_eq!(outcome.normalized.matches("data:image/png;base64,").count(), 2);
}

#[test]
fn word_markup_is_cleaned_but_formatting_kept() {
    let (tmp, workflow, source) = setup();
    let dest = tmp.path().join("Output");

    let outcome = workflow
        .convert_document(&source, &dest, "Firma", ConversionOptions::default())
        .unwrap();
    let html = &outcome.normalized;

    assert!(!html.contains("<style"), "{}", html);
    assert!(!html.contains("o:p"), "{}", html);
    assert!(!html.contains("mso-fareast"), "{}", html);
    assert!(!html.contains("windowtext"), "{}", html);
    assert!(!html.contains("<meta"), "{}", html);
    assert!(html.contains("#1F497D") || html.contains("#1f497d"), "{}", html);
    assert!(html.contains("Calibri"), "{}", html);
    assert!(html.contains(r#"border="0""#), "{}", html);
    assert!(html.contains("mso-border-alt:none"), "{}", html);

    // already-normalized output is a fixed point
    assert_eq!(normalize(html, true), *html);

    let text = fs::read_to_string(&outcome.bundle.text_path).unwrap();
    assert!(text.starts_with("Mario Rossi"), "{}", text);
    assert!(text.contains("Via Roma 1\nMilano"), "{}", text);
    assert!(!text.contains("\n\n\n"));
}

#[test]
fn table_fix_can_be_disabled() {
    let (tmp, workflow, source) = setup();
    let dest = tmp.path().join("Output");
    let options = ConversionOptions {
        fix_table_borders: false,
        ..ConversionOptions::default()
    };

    let outcome = workflow.convert_document(&source, &dest, "Firma", options).unwrap();
    assert!(outcome.normalized.contains(r#"border="1""#), "{}", outcome.normalized);
}

#[test]
fn overwrite_into_default_folder_takes_backup() {
    let (tmp, workflow, source) = setup();
    let signatures = tmp.path().join("Signatures");
    fs::create_dir_all(&signatures).unwrap();
    fs::write(signatures.join("Firma.htm"), "<p>old</p>").unwrap();

    assert!(workflow
        .prepare_destination(&signatures, "Firma", false, true)
        .is_err());

    let backup = workflow
        .prepare_destination(&signatures, "Firma", true, true)
        .unwrap()
        .expect("backup of the default folder");
    workflow
        .convert_document(&source, &signatures, "Firma", ConversionOptions::default())
        .unwrap();

    let backups = workflow.repository().list_backups(&signatures);
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0].file_name, backup.file_name);
    assert!(fs::read_to_string(signatures.join("Firma.htm"))
        .unwrap()
        .contains("Mario Rossi"));
}

#[test]
fn plain_text_separates_paragraphs() {
    let text = build_plain_text("<p>A</p><p>B</p>");
    assert!(text.contains("A\nB"));
}

#[test]
fn cleanup_of_missing_folder_is_a_no_op() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("gone");
    assert!(cleanup_directory_with_retries(
        &missing,
        "test",
        3,
        Duration::from_secs(5)
    ));
    assert!(!missing.exists());
}
