//! BLAKE3 content hashing for tamper evidence.

use serde::Serialize;

use crate::SnapshotRecord;

/// Hashable representation of a record (excludes content_hash).
#[derive(Serialize)]
struct HashableRecord<'a> {
    name: &'a str,
    saved_at: &'a chrono::DateTime<chrono::Utc>,
    content: &'a serde_json::Value,
}

/// Serializes every field except `content_hash` and hashes the bytes.
/// Returns the hex-encoded hash.
pub fn compute_record_hash(record: &SnapshotRecord) -> String {
    let hashable = HashableRecord {
        name: &record.name,
        saved_at: &record.saved_at,
        content: &record.content,
    };

    // Value maps serialize with sorted keys, so the bytes are canonical.
    let json = serde_json::to_vec(&hashable).unwrap_or_default();
    blake3::hash(&json).to_hex().to_string()
}
