use assert_cmd::cargo::cargo_bin_cmd;
use lopdf::content::Content;
use lopdf::{Document, Object};
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../tests/fixtures").join(name)
}

fn page_operators(doc: &Document, page: u32) -> Vec<String> {
    let page_id = doc.get_pages()[&page];
    let content = doc.get_page_content(page_id).expect("page content should be readable");
    Content::decode(&content)
        .expect("page content should decode")
        .operations
        .into_iter()
        .map(|operation| operation.operator)
        .collect()
}

fn load_pdf(path: &Path) -> Document {
    Document::load(path).expect("output should be a readable PDF")
}

#[test]
fn info_emits_stable_json_contract() {
    let output = cargo_bin_cmd!("pdfcraft-cli")
        .arg("info")
        .arg(fixture("small.pdf"))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).expect("stdout should contain valid json");

    assert_eq!(value["page_count"], 1);
    assert_eq!(value["pages"][0]["width"], 612.0);
    assert_eq!(value["pages"][0]["height"], 792.0);
    assert_eq!(value["pages"][0]["rotate"], 0);
    assert!(value["path"].as_str().is_some_and(|path| path.ends_with("small.pdf")));
}

#[test]
fn info_reports_every_page_with_rotation() {
    let output = cargo_bin_cmd!("pdfcraft-cli")
        .arg("info")
        .arg(fixture("medium.pdf"))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).expect("stdout should contain valid json");

    assert_eq!(value["page_count"], 3);
    assert_eq!(value["pages"][1]["width"], 842.0);
    assert_eq!(value["pages"][2]["rotate"], 90);
}

#[test]
fn info_fails_for_missing_file() {
    cargo_bin_cmd!("pdfcraft-cli")
        .arg("info")
        .arg(fixture("missing.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("file does not exist"));
}

#[test]
fn info_fails_for_invalid_pdf() {
    cargo_bin_cmd!("pdfcraft-cli")
        .arg("info")
        .arg(fixture("invalid.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open PDF"));
}

#[test]
fn info_fails_for_encrypted_marker_pdf() {
    cargo_bin_cmd!("pdfcraft-cli")
        .arg("info")
        .arg(fixture("encrypted-marker.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("encrypted PDFs are not supported"));
}

#[test]
fn export_merges_annotations_into_pages() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let output_path = temp.path().join("annotated.pdf");

    cargo_bin_cmd!("pdfcraft-cli")
        .arg("export")
        .arg(fixture("medium.pdf"))
        .arg("--annotations")
        .arg(fixture("annotations.json"))
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("annotated.pdf"));

    let doc = load_pdf(&output_path);
    assert_eq!(doc.get_pages().len(), 3);
    assert!(page_operators(&doc, 1).contains(&"S".to_owned()));
    assert!(page_operators(&doc, 2).contains(&"gs".to_owned()));
    assert!(page_operators(&doc, 3).contains(&"Tj".to_owned()));
}

#[test]
fn export_attaches_note_annotations_when_not_flattened() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let output_path = temp.path().join("notes.pdf");

    cargo_bin_cmd!("pdfcraft-cli")
        .arg("export")
        .arg(fixture("medium.pdf"))
        .arg("--annotations")
        .arg(fixture("annotations.json"))
        .arg("--flatten-notes")
        .arg("false")
        .arg("--note-annotations")
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success();

    let doc = load_pdf(&output_path);
    let page_id = doc.get_pages()[&3];
    assert!(!page_operators(&doc, 3).contains(&"Tj".to_owned()));

    let page = doc.get_dictionary(page_id).expect("page should be a dictionary");
    let annots = page
        .get(b"Annots")
        .and_then(Object::as_array)
        .expect("page should carry annotations");
    assert_eq!(annots.len(), 1);

    let annot_id = annots[0].as_reference().expect("annotation should be indirect");
    let annot = doc.get_dictionary(annot_id).expect("annotation should be a dictionary");
    assert_eq!(
        annot.get(b"Contents").and_then(Object::as_str).expect("contents should be a string"),
        b"Check totals"
    );
}

#[test]
fn export_without_annotations_copies_pages() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let output_path = temp.path().join("copy.pdf");

    cargo_bin_cmd!("pdfcraft-cli")
        .arg("export")
        .arg(fixture("small.pdf"))
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success();

    assert_eq!(page_operators(&load_pdf(&output_path), 1), ["g", "re", "f"]);
}

#[test]
fn export_fails_when_annotation_page_is_missing() {
    let temp = tempfile::tempdir().expect("temp dir should be created");

    cargo_bin_cmd!("pdfcraft-cli")
        .arg("export")
        .arg(fixture("small.pdf"))
        .arg("--annotations")
        .arg(fixture("annotations.json"))
        .arg("--output")
        .arg(temp.path().join("never.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to export PDF"));

    assert!(!temp.path().join("never.pdf").exists());
}

#[test]
fn export_rejects_newer_config_schema() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let config_path = temp.path().join("config.json");
    fs::write(&config_path, r#"{"version":99,"config":{}}"#).expect("config should be written");

    cargo_bin_cmd!("pdfcraft-cli")
        .arg("--config")
        .arg(&config_path)
        .arg("export")
        .arg(fixture("small.pdf"))
        .arg("--output")
        .arg(temp.path().join("out.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config"));
}

#[test]
fn export_reports_inverted_zoom_bounds_instead_of_panicking() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let config_path = temp.path().join("config.json");
    fs::write(&config_path, r#"{"version":1,"config":{"min_scale":4.0}}"#)
        .expect("config should be written");

    cargo_bin_cmd!("pdfcraft-cli")
        .arg("--config")
        .arg(&config_path)
        .arg("export")
        .arg(fixture("small.pdf"))
        .arg("--output")
        .arg(temp.path().join("out.pdf"))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("min_scale 4 is greater than max_scale 3"))
        .stderr(predicate::str::contains("panicked").not());
}

#[test]
fn share_put_then_get_writes_deterministic_name() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let store = temp.path().join("store");
    let downloads = temp.path().join("downloads");

    cargo_bin_cmd!("pdfcraft-cli")
        .args(["share", "put"])
        .arg(fixture("small.pdf"))
        .args(["--id", "team-review_1"])
        .arg("--store")
        .arg(&store)
        .assert()
        .success();

    cargo_bin_cmd!("pdfcraft-cli")
        .args(["share", "get", "team-review_1"])
        .arg("--store")
        .arg(&store)
        .arg("--output-dir")
        .arg(&downloads)
        .assert()
        .success()
        .stdout(predicate::str::contains("shared-team-review_1.pdf"));

    let original = fs::read(fixture("small.pdf")).expect("fixture should be readable");
    let shared =
        fs::read(downloads.join("shared-team-review_1.pdf")).expect("shared file should exist");
    assert_eq!(shared, original);
}

#[test]
fn share_get_reports_unknown_id() {
    let temp = tempfile::tempdir().expect("temp dir should be created");

    cargo_bin_cmd!("pdfcraft-cli")
        .args(["share", "get", "nobody"])
        .arg("--store")
        .arg(temp.path())
        .arg("--output-dir")
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("shared document not found: nobody"));
}

#[test]
fn share_put_rejects_path_like_ids() {
    let temp = tempfile::tempdir().expect("temp dir should be created");

    cargo_bin_cmd!("pdfcraft-cli")
        .args(["share", "put"])
        .arg(fixture("small.pdf"))
        .args(["--id", "../escape"])
        .arg("--store")
        .arg(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid storage key"));
}

#[test]
fn version_prints_package_version() {
    cargo_bin_cmd!("pdfcraft-cli")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::diff(format!("{}\n", env!("CARGO_PKG_VERSION"))));
}
