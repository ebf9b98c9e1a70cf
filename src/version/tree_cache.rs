//! External collaborators for the version hasher (§6): `FileScanner` (walks a
//! source tree into `{path, hash}` pairs) and `TreeCache` (content-addressed
//! memoization). Also the `.garden-version` persisted tree-version cache file
//! (§6 Persisted state).
//!
//! Grounded on the teacher's `Checkpointer` trait + `InMemoryCheckpointer`
//! pair in `src/checkpoint/mod.rs`: a trait for the real backend (left to the
//! embedding application) plus one in-memory reference implementation good
//! enough for tests and small programs.

use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// One scanned file: its path (relative to the scan root) and content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// POSIX-style path, relative to the scan root.
    pub path: String,
    /// Content hash of the file (scanner-defined digest).
    pub hash: String,
}

/// `{contentHash, files}` summary of a source tree, as read from or written
/// to a `.garden-version` cache file, or produced fresh by a `FileScanner`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeVersion {
    /// Combined content hash over every scanned file (scanner-defined).
    #[serde(rename = "contentHash")]
    pub content_hash: String,
    /// Sorted file list; excludes the config file itself.
    pub files: Vec<FileEntry>,
}

/// Parameters for a `FileScanner::get_files` call.
pub struct ScanParams<'a> {
    /// Root directory to scan.
    pub root: &'a Path,
    /// Include glob patterns; an empty slice means "scan is skipped" per §6.
    pub include: &'a [String],
    /// Exclude glob patterns.
    pub exclude: &'a [String],
    /// Human-readable description used in scanner diagnostics/log lines.
    pub path_description: &'a str,
}

/// Parameters for a `FileScanner::get_tree_version` call.
pub struct TreeVersionParams<'a> {
    /// The task/module config whose source tree is being fingerprinted.
    pub config: &'a Value,
}

/// Scans a working copy for the files relevant to a task/module's version
/// computation. A true external collaborator — no implementation ships with
/// this crate; callers provide their own (backed by a VCS, a filesystem walk,
/// a remote index, etc).
#[async_trait]
pub trait FileScanner: Send + Sync {
    /// List `{path, hash}` pairs under `params.root`, honoring include/exclude
    /// patterns. Must be deterministic given identical working-copy content.
    async fn get_files(&self, params: ScanParams<'_>) -> Result<Vec<FileEntry>>;

    /// Compute the `TreeVersion` for a config: a sorted file list (excluding
    /// the config file itself) plus a combined content hash. When the
    /// config's `include` patterns are empty, the scan is skipped entirely
    /// and the content hash is derived from the config alone.
    async fn get_tree_version(&self, params: TreeVersionParams<'_>) -> Result<TreeVersion>;
}

/// Tags attached to a `TreeCache::set` entry, used for bulk invalidation.
pub type TreeCacheTags = Vec<String>;

/// Content-addressed memoization for version computations (§5 "Shared
/// resources"). A true external collaborator in production (typically backed
/// by a persistent store); this crate ships one in-memory reference
/// implementation for tests and small programs.
#[async_trait]
pub trait TreeCache: Send + Sync {
    /// Store `value` under `key`, tagged for later bulk invalidation.
    async fn set(&self, key: &str, value: Value, tags: TreeCacheTags);

    /// Fetch the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Option<Value>;

    /// Invalidate every entry carrying `tag`.
    async fn invalidate_tag(&self, tag: &str);
}

/// In-memory `TreeCache`, keyed by string, with tag-based bulk invalidation.
/// Mirrors the teacher's `InMemoryCheckpointer`.
#[derive(Default)]
pub struct InMemoryTreeCache {
    entries: DashMap<String, (Value, TreeCacheTags)>,
}

impl InMemoryTreeCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TreeCache for InMemoryTreeCache {
    async fn set(&self, key: &str, value: Value, tags: TreeCacheTags) {
        self.entries.insert(key.to_string(), (value, tags));
    }

    async fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.0.clone())
    }

    async fn invalidate_tag(&self, tag: &str) {
        self.entries.retain(|_, (_, tags)| !tags.iter().any(|t| t == tag));
    }
}

/// Normalize a path to POSIX separators for on-disk persistence (§6: "POSIX-
/// normalized relative paths").
fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Read a `.garden-version` file if it exists, preferring it over a fresh
/// scan (§6 Persisted state).
pub fn read_tree_version_file(path: &Path) -> Result<Option<TreeVersion>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)?;
    let version: TreeVersion = serde_json::from_str(&raw)?;
    Ok(Some(version))
}

/// Write a `.garden-version` file, normalizing every file path to use
/// forward slashes.
pub fn write_tree_version_file(path: &Path, version: &TreeVersion) -> Result<()> {
    let normalized = TreeVersion {
        content_hash: version.content_hash.clone(),
        files: version
            .files
            .iter()
            .map(|f| FileEntry {
                path: normalize_path(&f.path),
                hash: f.hash.clone(),
            })
            .collect(),
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let raw = serde_json::to_string_pretty(&normalized)?;
    std::fs::write(path, raw)?;
    Ok(())
}
