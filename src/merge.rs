//! Deterministic merge of validated records.
//!
//! Records are bucketed by canonical id; each bucket elects one winner under
//! a total order (encoded version desc, updated stamp desc, origin repo asc,
//! origin path asc) and two fields are unioned across the whole bucket:
//! the flat `overlays` list and the `annex.lineage` list. Everything else
//! comes from the winner alone. This shallow dominant-record merge is a
//! deliberate narrowness, not a missing deep merge.
//!
//! The whole stage is a pure function of the input set: permutation
//! invariant and idempotent, which is what keeps output checksums stable.

use crate::record::SourceRecord;
use crate::util::sha256_hex;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Path segment marking card collections in source repositories.
const CARD_SEGMENT: &str = "liber";

/// The elected representative of one identity bucket.
#[derive(Debug, Clone)]
pub struct MergedRecord {
    pub id: String,
    pub data: Value,
}

/// One dataset entry for downstream consumers: enough to locate and verify
/// provenance without re-reading the full dataset.
#[derive(Debug, Clone, Serialize)]
pub struct IndexEntry {
    pub id: String,
    pub kind: String,
    pub title: String,
    pub sources: Vec<String>,
    pub checksum: String,
}

/// Informational record of a bucket whose variants hash differently.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictEntry {
    pub id: String,
    pub variants: Vec<ConflictVariant>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictVariant {
    pub origin: String,
    pub checksum: String,
    pub version: Option<String>,
    pub updated: Option<String>,
}

#[derive(Debug)]
pub struct MergeOutcome {
    pub records: Vec<MergedRecord>,
    pub index: Vec<IndexEntry>,
    pub conflicts: Vec<ConflictEntry>,
}

/// Merge all valid records into one canonical dataset.
pub fn merge(records: &[SourceRecord]) -> MergeOutcome {
    let mut buckets: BTreeMap<&str, Vec<&SourceRecord>> = BTreeMap::new();
    for record in records {
        buckets.entry(record.canonical_id()).or_default().push(record);
    }

    let mut merged = Vec::new();
    let mut index = Vec::new();
    let mut conflicts = Vec::new();

    for (id, bucket) in &buckets {
        let winner = bucket
            .iter()
            .copied()
            .reduce(|best, candidate| if outranks(candidate, best) { candidate } else { best })
            .unwrap_or_else(|| unreachable!("bucket is never empty"));

        let data = merge_union_fields(winner, bucket);
        if let Some(conflict) = detect_conflict(id, bucket) {
            conflicts.push(conflict);
        }
        index.push(index_entry(id, &data, bucket));
        merged.push(MergedRecord {
            id: (*id).to_string(),
            data,
        });
    }

    tracing::info!(
        inputs = records.len(),
        identities = merged.len(),
        conflicts = conflicts.len(),
        "merge complete"
    );
    MergeOutcome {
        records: merged,
        index,
        conflicts,
    }
}

/// True when `a` outranks `b` in the winner total order.
fn outranks(a: &SourceRecord, b: &SourceRecord) -> bool {
    let (va, vb) = (a.version_rank(), b.version_rank());
    if va != vb {
        return va > vb;
    }
    let (ua, ub) = (a.updated_rank(), b.updated_rank());
    if ua != ub {
        return ua > ub;
    }
    if a.origin.repo != b.origin.repo {
        return a.origin.repo < b.origin.repo;
    }
    a.origin.path < b.origin.path
}

/// Clone the winner and write the two union fields back as sorted,
/// de-duplicated arrays collected across the whole bucket.
fn merge_union_fields(winner: &SourceRecord, bucket: &[&SourceRecord]) -> Value {
    let mut data = winner.data.clone();

    let overlays = collect_strings(bucket, |record| record.data.get("overlays"));
    if let Some(values) = overlays {
        data["overlays"] = json!(values);
    }

    let lineage = collect_strings(bucket, |record| {
        record.data.get("annex").and_then(|annex| annex.get("lineage"))
    });
    if let Some(values) = lineage {
        if !data.get("annex").is_some_and(Value::is_object) {
            data["annex"] = json!({});
        }
        data["annex"]["lineage"] = json!(values);
    }

    data
}

/// Union the string elements of an array field across the bucket. Returns
/// `None` when no member carries the field at all, so absent stays absent.
fn collect_strings<'a>(
    bucket: &[&'a SourceRecord],
    field: impl Fn(&'a SourceRecord) -> Option<&'a Value>,
) -> Option<Vec<String>> {
    let mut present = false;
    let mut values = BTreeSet::new();
    for &record in bucket {
        let Some(array) = field(record).and_then(Value::as_array) else {
            continue;
        };
        present = true;
        for element in array {
            match element.as_str() {
                Some(text) => {
                    values.insert(text.to_string());
                }
                None => tracing::debug!(
                    origin = %record.origin,
                    "skipping non-string union element"
                ),
            }
        }
    }
    present.then(|| values.into_iter().collect())
}

/// A bucket with more than one member conflicts only when the raw contents
/// hash differently; identical copies across sources are not a conflict.
fn detect_conflict(id: &str, bucket: &[&SourceRecord]) -> Option<ConflictEntry> {
    if bucket.len() < 2 {
        return None;
    }
    let checksums: BTreeSet<String> =
        bucket.iter().map(|record| sha256_hex(record.raw.as_bytes())).collect();
    if checksums.len() < 2 {
        return None;
    }
    let mut variants: Vec<ConflictVariant> = bucket
        .iter()
        .map(|record| ConflictVariant {
            origin: record.origin.to_string(),
            checksum: sha256_hex(record.raw.as_bytes()),
            version: record.version().map(str::to_string),
            updated: record.updated().map(str::to_string),
        })
        .collect();
    variants.sort_by(|a, b| a.origin.cmp(&b.origin));
    Some(ConflictEntry {
        id: id.to_string(),
        variants,
    })
}

fn index_entry(id: &str, data: &Value, bucket: &[&SourceRecord]) -> IndexEntry {
    let kind = if bucket
        .iter()
        .any(|record| record.origin.path.split('/').any(|segment| segment == CARD_SEGMENT))
    {
        "card".to_string()
    } else {
        data.get("kind")
            .and_then(Value::as_str)
            .unwrap_or("node")
            .to_string()
    };
    let title = data
        .get("title")
        .or_else(|| data.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let mut sources: Vec<String> = bucket.iter().map(|record| record.origin.to_string()).collect();
    sources.sort();
    IndexEntry {
        id: id.to_string(),
        kind,
        title,
        sources,
        checksum: sha256_hex(canonical_bytes(data).as_slice()),
    }
}

/// Canonical serialization for checksumming: compact JSON with sorted keys
/// (serde_json's default map ordering).
pub fn canonical_bytes(data: &Value) -> Vec<u8> {
    serde_json::to_vec(data).unwrap_or_default()
}
