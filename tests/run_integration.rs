//! End-to-end runs of the published binary against tempdir fixtures.

use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::Command;

const BIN: &str = env!("CARGO_BIN_EXE_codex-sync");

fn write_fixture(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create fixture dir");
    }
    fs::write(path, content).expect("write fixture");
}

fn run(config: &Path, out: &Path) -> std::process::Output {
    Command::new(BIN)
        .arg("run")
        .arg("--config")
        .arg(config)
        .arg("--out")
        .arg(out)
        .env_remove("CODEX_SYNC_TOKEN")
        .output()
        .expect("run codex-sync")
}

fn read_json(path: &Path) -> Value {
    let content = fs::read_to_string(path).expect("read artifact");
    serde_json::from_str(&content).expect("parse artifact")
}

#[test]
fn consolidates_two_roots_and_reports_soft_failures() {
    let dir = tempfile::tempdir().expect("tempdir");
    let alpha = dir.path().join("alpha");
    let beta = dir.path().join("beta");

    write_fixture(
        &alpha.join("nodes/crown.json"),
        r#"{"id": "C144N-001", "title": "Crown (old)", "version": "1.2.0", "overlays": ["a", "b"]}"#,
    );
    write_fixture(
        &beta.join("nodes/crown.json"),
        r#"{"id": "C144N-001", "title": "Crown", "version": "1.3.0", "overlays": ["b", "c"],
            "notes": "restored by Jane Doe"}"#,
    );
    write_fixture(&alpha.join("nodes/broken.json"), "{not json");
    write_fixture(
        &beta.join("liber/fool.json"),
        r#"{"id": "FOOL", "kind": "card", "name": "The Fool", "safety": {"autoplay": true}}"#,
    );

    let config = dir.path().join("config.json");
    write_fixture(
        &config,
        &format!(
            r#"{{
                "local": {{"roots": ["{}", "{}"], "globs": ["**/*.json"]}},
                "blocklist": ["(?i)jane doe"]
            }}"#,
            alpha.display(),
            beta.display()
        ),
    );

    let out = dir.path().join("dist");
    let output = run(&config, &out);
    assert!(
        output.status.success(),
        "run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    // Dataset: one merged crown node (1.3.0 wins) plus the card.
    let dataset = read_json(&out.join("codex.json"));
    let records = dataset.as_array().expect("dataset array");
    assert_eq!(records.len(), 2);
    let crown = records
        .iter()
        .find(|record| record["id"] == "C144N-001")
        .expect("crown present");
    assert_eq!(crown["title"], "Crown");
    assert_eq!(crown["version"], "1.3.0");
    assert_eq!(crown["overlays"], serde_json::json!(["a", "b", "c"]));

    // Index: provenance from both roots, card kind inferred from liber path.
    let index = read_json(&out.join("index.json"));
    let entries = index.as_array().expect("index array");
    assert_eq!(entries.len(), 2);
    let crown_entry = entries
        .iter()
        .find(|entry| entry["id"] == "C144N-001")
        .expect("crown indexed");
    assert_eq!(crown_entry["sources"].as_array().map(Vec::len), Some(2));
    let fool_entry = entries
        .iter()
        .find(|entry| entry["id"] == "FOOL")
        .expect("fool indexed");
    assert_eq!(fool_entry["kind"], "card");

    // Safety: the blocklist hit on the winning crown variant and the unsafe
    // autoplay default are both surfaced in the artifact.
    let safety = read_json(&out.join("safety.json"));
    let findings = safety["findings"].as_array().expect("findings array");
    let ids: Vec<&str> = findings
        .iter()
        .filter_map(|finding| finding["id"].as_str())
        .collect();
    assert!(ids.contains(&"C144N-001"));
    assert!(ids.contains(&"FOOL"));

    // Report: the conflict and the broken record are listed for triage; the
    // broken record never reaches dataset or index.
    let report = fs::read_to_string(out.join("report.md")).expect("read report");
    assert!(report.contains("- conflicts: 1"));
    assert!(report.contains("- validation errors: 1"));
    assert!(report.contains("nodes/broken.json"));
    assert!(!dataset.to_string().contains("broken"));
    assert!(!index.to_string().contains("broken"));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("2 identities from 4 inputs"));
}

#[test]
fn runs_are_byte_reproducible() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("shared");
    write_fixture(
        &root.join("nodes/a.json"),
        r#"{"id": "C144N-010", "title": "Alpha", "annex": {"lineage": ["z", "a"]}}"#,
    );
    write_fixture(
        &root.join("nodes/b.json"),
        r#"{"id": "C144N-011", "title": "Beta"}"#,
    );
    let config = dir.path().join("config.json");
    write_fixture(
        &config,
        &format!(
            r#"{{"local": {{"roots": ["{}"], "globs": ["nodes/*.json"]}}}}"#,
            root.display()
        ),
    );

    let out_one = dir.path().join("run1");
    let out_two = dir.path().join("run2");
    assert!(run(&config, &out_one).status.success());
    assert!(run(&config, &out_two).status.success());

    for name in ["codex.json", "index.json", "safety.json", "report.md"] {
        let one = fs::read(out_one.join(name)).expect("read first");
        let two = fs::read(out_two.join(name)).expect("read second");
        assert_eq!(one, two, "{name} differs between runs");
    }
}

#[test]
fn unreadable_config_exits_nonzero_without_writing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("dist");
    let output = run(&dir.path().join("missing.json"), &out);
    assert!(!output.status.success());
    assert!(!out.exists(), "output dir must not be created on config error");
}

#[test]
fn config_without_sources_exits_nonzero() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = dir.path().join("config.json");
    write_fixture(&config, "{}");
    let out = dir.path().join("dist");
    let output = run(&config, &out);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no sources configured"));
    assert!(!out.exists());
}
