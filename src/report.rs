//! Artifact serialization.
//!
//! Four fixed-name artifacts per run: the merged dataset, the index, the
//! safety findings, and a Markdown report for human triage. Serialization is
//! deterministic (sorted maps, sorted arrays, no timestamps) so byte-equal
//! inputs produce byte-equal artifacts.

use crate::merge::MergeOutcome;
use crate::safety::SafetyFinding;
use crate::util::checksum_prefix;
use crate::validate::ValidationError;
use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::Path;

pub const DATASET_FILE: &str = "codex.json";
pub const INDEX_FILE: &str = "index.json";
pub const SAFETY_FILE: &str = "safety.json";
pub const REPORT_FILE: &str = "report.md";

/// Cap on per-section listings in the Markdown report.
const REPORT_SAMPLE_LIMIT: usize = 20;

/// Everything the writer needs from the earlier stages.
pub struct RunSummary<'a> {
    pub input_count: usize,
    pub outcome: &'a MergeOutcome,
    pub findings: &'a [SafetyFinding],
    pub errors: &'a [ValidationError],
}

/// Write all four artifacts into `out_dir`, creating it if needed.
pub fn write_artifacts(out_dir: &Path, summary: &RunSummary<'_>) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("create output dir {}", out_dir.display()))?;

    let dataset: Vec<&Value> = summary.outcome.records.iter().map(|record| &record.data).collect();
    write_json(out_dir, DATASET_FILE, &dataset)?;
    write_json(out_dir, INDEX_FILE, &summary.outcome.index)?;
    write_json(
        out_dir,
        SAFETY_FILE,
        &serde_json::json!({ "findings": summary.findings }),
    )?;

    let report = render_report(summary);
    let path = out_dir.join(REPORT_FILE);
    fs::write(&path, report).with_context(|| format!("write {}", path.display()))?;

    tracing::info!(out = %out_dir.display(), "artifacts written");
    Ok(())
}

fn write_json<T: serde::Serialize>(out_dir: &Path, name: &str, value: &T) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value).context("serialize artifact")?;
    bytes.push(b'\n');
    let path = out_dir.join(name);
    fs::write(&path, &bytes).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn render_report(summary: &RunSummary<'_>) -> String {
    let mut report = String::new();
    report.push_str("# Consolidation Report\n\n");
    report.push_str(&format!("- inputs: {}\n", summary.input_count));
    report.push_str(&format!("- merged identities: {}\n", summary.outcome.records.len()));
    report.push_str(&format!("- conflicts: {}\n", summary.outcome.conflicts.len()));
    report.push_str(&format!("- validation errors: {}\n", summary.errors.len()));
    report.push_str(&format!("- safety findings: {}\n", summary.findings.len()));

    report.push_str("\n## Conflicts\n\n");
    if summary.outcome.conflicts.is_empty() {
        report.push_str("None.\n");
    }
    for conflict in summary.outcome.conflicts.iter().take(REPORT_SAMPLE_LIMIT) {
        report.push_str(&format!("### {}\n", conflict.id));
        for variant in &conflict.variants {
            report.push_str(&format!(
                "- `{}` checksum={} version={} updated={}\n",
                variant.origin,
                checksum_prefix(&variant.checksum),
                variant.version.as_deref().unwrap_or("-"),
                variant.updated.as_deref().unwrap_or("-"),
            ));
        }
    }
    push_overflow(&mut report, summary.outcome.conflicts.len());

    report.push_str("\n## Validation errors\n\n");
    if summary.errors.is_empty() {
        report.push_str("None.\n");
    }
    for error in summary.errors.iter().take(REPORT_SAMPLE_LIMIT) {
        report.push_str(&format!("- `{}`: {}\n", error.origin, error.err));
    }
    push_overflow(&mut report, summary.errors.len());

    report.push_str("\n## Safety findings\n\n");
    if summary.findings.is_empty() {
        report.push_str("None.\n");
    }
    for finding in summary.findings {
        let flags: Vec<String> = finding
            .flags
            .iter()
            .map(|flag| match &flag.detail {
                Some(detail) => format!("{} ({detail})", flag.kind),
                None => flag.kind.to_string(),
            })
            .collect();
        report.push_str(&format!("- {}: {}\n", finding.id, flags.join(", ")));
    }

    report
}

fn push_overflow(report: &mut String, total: usize) {
    if total > REPORT_SAMPLE_LIMIT {
        report.push_str(&format!("... and {} more\n", total - REPORT_SAMPLE_LIMIT));
    }
}
