//! Core record types shared by every pipeline stage.
//!
//! A `RawRecord` is what source loaders produce: origin plus raw text, no
//! interpretation. The validator parses it into a `SourceRecord`, which is
//! immutable for the rest of the run.

use serde_json::Value;
use std::fmt;
use std::sync::OnceLock;

/// Where a record came from: a repository (or local root) name plus the
/// path relative to it, always `/`-separated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceOrigin {
    pub repo: String,
    pub path: String,
}

impl fmt::Display for SourceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repo, self.path)
    }
}

/// One matched file from one source, before any parsing.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub origin: SourceOrigin,
    pub raw: String,
}

/// A parsed, shape-validated record.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub origin: SourceOrigin,
    pub raw: String,
    pub data: Value,
}

/// Canonical identifier pattern: uppercase alphanumerics plus `-`, `_`, `:`.
pub fn id_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| regex::Regex::new(r"^[A-Z0-9][A-Z0-9_:-]*$").expect("id pattern compiles"))
}

impl SourceRecord {
    /// Canonical id, present on every record that passed validation.
    pub fn canonical_id(&self) -> &str {
        self.data
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Declared semantic version string, if any.
    pub fn version(&self) -> Option<&str> {
        self.data.get("version").and_then(Value::as_str)
    }

    /// Encoded version used for winner ranking; 0 when absent or malformed.
    pub fn version_rank(&self) -> u64 {
        self.version().map_or(0, encode_version)
    }

    /// Declared last-updated stamp, if any.
    pub fn updated(&self) -> Option<&str> {
        self.data.get("updated").and_then(Value::as_str)
    }

    /// Updated stamp usable as a ranking key. ISO-8601 dates and datetimes
    /// order correctly under byte comparison, so the key is the string
    /// itself once its shape checks out. Malformed stamps rank lowest.
    pub fn updated_rank(&self) -> Option<&str> {
        self.updated().filter(|raw| is_iso_stamp(raw))
    }
}

/// Encode `major.minor.patch` as `major*1_000_000 + minor*1_000 + patch`.
/// Any component that fails to parse, or a total that would overflow the
/// encoding, yields 0 for the whole version.
pub fn encode_version(raw: &str) -> u64 {
    let parts: Vec<&str> = raw.split('.').collect();
    if parts.len() > 3 {
        return 0;
    }
    let mut encoded = 0u64;
    for (part, scale) in parts.iter().zip([1_000_000u64, 1_000, 1]) {
        let Ok(value) = part.parse::<u64>() else {
            return 0;
        };
        match value.checked_mul(scale).and_then(|term| encoded.checked_add(term)) {
            Some(total) => encoded = total,
            None => return 0,
        }
    }
    encoded
}

/// Split one matched source file into raw record payloads.
///
/// Markdown ledgers carry records as fenced json code blocks; each block
/// becomes its own payload, with the path suffixed `#n` (1-based block
/// number) so provenance stays distinct. Any other file is a single
/// whole-file payload. A ledger with no fenced blocks contributes nothing.
pub fn extract_payloads(path: &str, text: &str) -> Vec<(String, String)> {
    if !path.ends_with(".md") {
        return vec![(path.to_string(), text.to_string())];
    }
    static FENCE: OnceLock<regex::Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        regex::Regex::new(r"(?ms)^```json[ \t\r]*\n(.*?)^```").expect("fence pattern compiles")
    });
    fence
        .captures_iter(text)
        .enumerate()
        .map(|(block, caps)| (format!("{path}#{}", block + 1), caps[1].trim().to_string()))
        .collect()
}

fn is_iso_stamp(raw: &str) -> bool {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        regex::Regex::new(
            r"^\d{4}-\d{2}-\d{2}([T ]\d{2}:\d{2}(:\d{2})?(\.\d+)?(Z|[+-]\d{2}:?\d{2})?)?$",
        )
        .expect("stamp pattern compiles")
    });
    pattern.is_match(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(data: Value) -> SourceRecord {
        SourceRecord {
            origin: SourceOrigin {
                repo: "main".to_string(),
                path: "nodes/x.json".to_string(),
            },
            raw: data.to_string(),
            data,
        }
    }

    #[test]
    fn encodes_semver_components() {
        assert_eq!(encode_version("1.2.3"), 1_002_003);
        assert_eq!(encode_version("0.0.1"), 1);
        assert_eq!(encode_version("10.0.0"), 10_000_000);
    }

    #[test]
    fn malformed_versions_encode_to_zero() {
        assert_eq!(encode_version("abc"), 0);
        assert_eq!(encode_version("1.2.3.4"), 0);
        assert_eq!(encode_version("1.x.3"), 0);
        assert_eq!(encode_version(""), 0);
    }

    #[test]
    fn oversized_versions_encode_to_zero_instead_of_overflowing() {
        assert_eq!(encode_version("18446744073710.0.0"), 0);
        assert_eq!(encode_version(&u64::MAX.to_string()), 0);
        assert_eq!(encode_version("1.18446744073709551615.0"), 0);
        // A ranked but absurd version must still lose to a sane one.
        assert!(encode_version("18446744073710.0.0") < encode_version("0.0.1"));
    }

    #[test]
    fn short_versions_still_encode() {
        assert_eq!(encode_version("2"), 2_000_000);
        assert_eq!(encode_version("1.5"), 1_005_000);
    }

    #[test]
    fn id_pattern_accepts_restrictive_ids() {
        assert!(id_pattern().is_match("C144N-001"));
        assert!(id_pattern().is_match("C144N-ARCANA_FOOL:0"));
        assert!(!id_pattern().is_match("lowercase"));
        assert!(!id_pattern().is_match("HAS SPACE"));
        assert!(!id_pattern().is_match(""));
    }

    #[test]
    fn non_markdown_files_are_one_whole_payload() {
        let payloads = extract_payloads("nodes/a.json", r#"{"id": "X"}"#);
        assert_eq!(payloads, vec![("nodes/a.json".to_string(), r#"{"id": "X"}"#.to_string())]);
    }

    #[test]
    fn markdown_ledgers_yield_one_payload_per_fenced_block() {
        let ledger = "# Ledger\n\n\
            ```json\n{\"id\": \"C144N-001\", \"title\": \"Crown\"}\n```\n\n\
            prose between blocks\n\n\
            ```json\n{\"id\": \"C144N-002\", \"title\": \"Root\"}\n```\n\n\
            ```rust\nfn ignored() {}\n```\n";
        let payloads = extract_payloads("ledgers/codex.md", ledger);
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].0, "ledgers/codex.md#1");
        assert_eq!(payloads[0].1, "{\"id\": \"C144N-001\", \"title\": \"Crown\"}");
        assert_eq!(payloads[1].0, "ledgers/codex.md#2");
    }

    #[test]
    fn ledger_without_fenced_json_contributes_nothing() {
        assert!(extract_payloads("notes.md", "# Just prose\n").is_empty());
    }

    #[test]
    fn updated_rank_requires_iso_shape() {
        let dated = record(json!({"id": "X", "updated": "2024-06-01"}));
        assert_eq!(dated.updated_rank(), Some("2024-06-01"));
        let stamped = record(json!({"id": "X", "updated": "2024-06-01T10:30:00Z"}));
        assert!(stamped.updated_rank().is_some());
        let junk = record(json!({"id": "X", "updated": "last tuesday"}));
        assert_eq!(junk.updated_rank(), None);
        let missing = record(json!({"id": "X"}));
        assert_eq!(missing.updated_rank(), None);
    }
}
