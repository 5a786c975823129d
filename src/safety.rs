//! Policy scan over the merged dataset.
//!
//! Three additive checks per merged identity: an unsafe default behavior
//! flag, a disallowed motion intensity level, and a configurable blocklist
//! of regex patterns run over the record's free text. Findings annotate the
//! output; they never remove records, and a hit is always surfaced in the
//! safety artifact rather than only in a log.

use crate::merge::MergedRecord;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

/// Motion level treated as a policy violation.
const DISALLOWED_MOTION: &str = "intense";

#[derive(Debug, Clone, Serialize)]
pub struct SafetyFinding {
    pub id: String,
    pub flags: Vec<SafetyFlag>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SafetyFlag {
    pub kind: FlagKind,
    /// The matched blocklist pattern, retained for audit; empty for the
    /// field-based checks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlagKind {
    UnsafeDefault,
    HighMotion,
    BlocklistHit,
}

impl std::fmt::Display for FlagKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::UnsafeDefault => "unsafe-default",
            Self::HighMotion => "high-motion",
            Self::BlocklistHit => "blocklist-hit",
        })
    }
}

/// Scan every merged record; identities with zero flags are omitted.
pub fn scan(records: &[MergedRecord], blocklist: &[Regex]) -> Vec<SafetyFinding> {
    let mut findings: Vec<SafetyFinding> = records
        .iter()
        .filter_map(|record| {
            let flags = scan_record(&record.data, blocklist);
            if flags.is_empty() {
                None
            } else {
                Some(SafetyFinding {
                    id: record.id.clone(),
                    flags,
                })
            }
        })
        .collect();
    findings.sort_by(|a, b| a.id.cmp(&b.id));
    if !findings.is_empty() {
        tracing::warn!(count = findings.len(), "safety findings present");
    }
    findings
}

fn scan_record(data: &Value, blocklist: &[Regex]) -> Vec<SafetyFlag> {
    let mut flags = Vec::new();
    let safety = data.get("safety");

    if safety
        .and_then(|safety| safety.get("autoplay"))
        .and_then(Value::as_bool)
        == Some(true)
    {
        flags.push(SafetyFlag {
            kind: FlagKind::UnsafeDefault,
            detail: None,
        });
    }

    if safety
        .and_then(|safety| safety.get("motion"))
        .and_then(Value::as_str)
        .is_some_and(|motion| motion.eq_ignore_ascii_case(DISALLOWED_MOTION))
    {
        flags.push(SafetyFlag {
            kind: FlagKind::HighMotion,
            detail: None,
        });
    }

    let text = free_text(data);
    for pattern in blocklist {
        if pattern.is_match(&text) {
            flags.push(SafetyFlag {
                kind: FlagKind::BlocklistHit,
                detail: Some(pattern.as_str().to_string()),
            });
        }
    }

    flags
}

/// Assemble the free-text fields subject to the blocklist.
fn free_text(data: &Value) -> String {
    let mut parts = Vec::new();
    for field in ["title", "name", "notes"] {
        if let Some(text) = data.get(field).and_then(Value::as_str) {
            parts.push(text);
        }
    }
    if let Some(lineage) = data
        .get("annex")
        .and_then(|annex| annex.get("lineage"))
        .and_then(Value::as_array)
    {
        parts.extend(lineage.iter().filter_map(Value::as_str));
    }
    parts.join("\n")
}
