//! Content-addressed version computation (spec §4.B) and the external
//! collaborator traits it depends on (§6): `FileScanner`, `TreeCache`, and the
//! `.garden-version` cache-file format.
//!
//! Grounded on the teacher's `src/state/versioning.rs` (canonical-serialization
//! discipline for version identity) and `src/checkpoint/mod.rs` (the
//! trait-plus-in-memory-reference-implementation shape used here for
//! `TreeCache`/`InMemoryTreeCache`, mirroring `Checkpointer`/
//! `InMemoryCheckpointer`).

mod canonical;
mod tree_cache;

pub use canonical::{config_hash_bytes, omit_runtime_fields};
pub use tree_cache::{FileScanner, InMemoryTreeCache, TreeCache, TreeCacheTags, TreeVersion};

use sha2::{Digest, Sha256};

/// A single dependency's contribution to a version computation: its name and
/// already-resolved version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyVersion {
    /// Dependency task/module name.
    pub name: String,
    /// Its own computed `inputVersion`.
    pub version: String,
}

/// Computes the stable `inputVersion` for a task/module configuration.
///
/// This is a pure function: the caller is responsible for obtaining the
/// config JSON, the `TreeVersion` (via `FileScanner`, an external
/// collaborator), and the dependency versions (by having already resolved
/// them).
pub fn compute_input_version(
    config: &serde_json::Value,
    tree: &TreeVersion,
    dependencies: &[DependencyVersion],
) -> String {
    let mut bytes = Vec::new();

    bytes.extend_from_slice(&config_hash_bytes(config));
    bytes.extend_from_slice(tree.content_hash.as_bytes());

    let mut sorted_deps = dependencies.to_vec();
    sorted_deps.sort_by(|a, b| a.name.cmp(&b.name));
    for dep in &sorted_deps {
        bytes.extend_from_slice(dep.name.as_bytes());
        bytes.extend_from_slice(dep.version.as_bytes());
    }

    let digest = Sha256::digest(&bytes);
    let hex = hex_encode(&digest);
    format!("v-{}", &hex[..10])
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(s, "{b:02x}").expect("writing to a String never fails");
    }
    s
}
