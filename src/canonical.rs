//! Canonical serialization and graph fingerprints.
//!
//! Fingerprints let tests and the persistence collaborator compare whole
//! step/edge sets cheaply without defining a wire format.
//!
//! ## Determinism Guarantees
//!
//! - Stable field order: struct fields serialize in declaration order
//! - Stable Vec order: inputs are sorted before hashing
//! - No HashMap allowed: use BTreeMap for maps in hashed data

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

use crate::types::{Edge, StepId};

/// Serialize a value to canonical JSON bytes for hashing.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("Canonical serialization failed")
}

/// Compute canonical hash of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    let bytes = to_canonical_bytes(value);
    xxh64(&bytes, 0)
}

/// Compute canonical hash and return as hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}

/// Deterministic fingerprint of a step set and edge set.
///
/// Two graphs (or display layers) with the same attached steps and the same
/// edges produce equal fingerprints, regardless of insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphFingerprint {
    /// Number of steps.
    pub step_count: u64,
    /// Number of edges.
    pub edge_count: u64,
    /// xxh64 of sorted step ids.
    pub step_hash: String,
    /// xxh64 of sorted (parent, child) pairs.
    pub edge_hash: String,
}

impl GraphFingerprint {
    /// Compute a fingerprint from step ids and edges.
    pub fn compute(step_ids: &[StepId], edges: &[Edge]) -> Self {
        let mut ids: Vec<String> = step_ids.iter().map(|s| s.as_uuid().to_string()).collect();
        ids.sort();

        let mut pairs: Vec<(String, String)> = edges
            .iter()
            .map(|e| (e.parent.as_uuid().to_string(), e.child.as_uuid().to_string()))
            .collect();
        pairs.sort();

        Self {
            step_count: step_ids.len() as u64,
            edge_count: edges.len() as u64,
            step_hash: canonical_hash_hex(&ids),
            edge_hash: canonical_hash_hex(&pairs),
        }
    }
}
