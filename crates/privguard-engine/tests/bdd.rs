use std::fs;
use std::path::Path;

use privguard_engine::Engine;
use privguard_types::{ScanOptions, Severity};
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn engine() -> Engine {
    let mut engine = Engine::new(2);
    engine.set_ai_enabled(false);
    engine
}

#[test]
fn given_marker_above_capture_when_scanned_then_no_consent_violation_is_emitted() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "consent.js",
        "@consent_required\nconst data_capture = \"email\";\n",
    );

    let run = engine().run(dir.path(), &ScanOptions::default());
    assert!(run.findings.iter().all(|f| f.rule_id != "R4"));
}

#[test]
fn given_capture_without_marker_when_scanned_then_consent_violation_is_emitted() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "capture.js", "const data_capture = \"email\";\n");

    let run = engine().run(dir.path(), &ScanOptions::default());
    let r4 = run.findings.iter().find(|f| f.rule_id == "R4").unwrap();
    assert_eq!(r4.line, 1);
    assert_eq!(r4.severity, Severity::High);
}

#[test]
fn given_mixed_findings_when_scanned_then_positives_are_flagged_not_counted() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "mixed.js",
        "tls = false\nstore(mask_email(user.email))\n",
    );

    let run = engine().run(dir.path(), &ScanOptions::default());
    let positives: Vec<_> = run.findings.iter().filter(|f| f.is_positive).collect();
    let countable: Vec<_> = run.findings.iter().filter(|f| f.is_countable()).collect();
    assert!(!positives.is_empty());
    assert!(!countable.is_empty());
    assert!(positives.iter().all(|f| f.severity == Severity::Low));
}

#[test]
fn given_a_file_in_an_extra_ignored_dir_when_scanned_then_it_is_skipped() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "vendor/lib.js", "tls = false\n");
    write(dir.path(), "src/app.js", "tls = false\n");

    let mut engine = engine();
    engine.set_ignored_extra(vec!["vendor".into()]);
    let run = engine.run(dir.path(), &ScanOptions::default());

    assert_eq!(run.files_scanned, 1);
    assert!(run.findings.iter().all(|f| f.file_path.contains("src")));
}

#[test]
fn given_identical_content_in_two_files_when_scanned_then_finding_ids_differ_by_path() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.js", "tls = false\n");
    write(dir.path(), "b.js", "tls = false\n");

    let run = engine().run(dir.path(), &ScanOptions::default());
    assert_eq!(run.findings.len(), 2);
    assert_ne!(run.findings[0].finding_id, run.findings[1].finding_id);
}

#[test]
fn given_nonexistent_root_when_scanned_then_run_is_empty_with_warning() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("does-not-exist");

    let run = engine().run(&missing, &ScanOptions::default());
    assert!(run.findings.is_empty());
    assert!(!run.warnings.is_empty());
}
