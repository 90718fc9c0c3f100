// src/cache/store.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cache::artifact::{Artifact, ArtifactKey};
use crate::fs::{FileSystem, RealFileSystem};

/// Relative directory (below the per-target directory) holding artifacts.
///
/// The effective path on disk is:
///
/// `<root>/<target>/analysis/<analyzer>.json`
pub const ANALYSIS_DIR: &str = "analysis";

/// Abstract storage for artifacts. Writes replace the previous artifact for
/// the same key.
pub trait ArtifactStore: Send + Sync {
    fn load(&self, key: &ArtifactKey) -> Result<Option<Artifact>>;
    fn save(&mut self, artifact: &Artifact) -> Result<()>;
    /// Returns whether an artifact was removed.
    fn remove(&mut self, key: &ArtifactKey) -> Result<bool>;
    /// Remove every artifact for `target`; returns how many were removed.
    fn remove_target(&mut self, target: &str) -> Result<usize>;
}

/// Stores artifacts as JSON files below `root`.
#[derive(Debug)]
pub struct FileArtifactStore<F: FileSystem = RealFileSystem> {
    root: PathBuf,
    fs: F,
}

impl FileArtifactStore<RealFileSystem> {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_fs(root, RealFileSystem)
    }
}

impl<F: FileSystem> FileArtifactStore<F> {
    pub fn with_fs(root: impl Into<PathBuf>, fs: F) -> Self {
        Self {
            root: root.into(),
            fs,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn target_dir(&self, target: &str) -> PathBuf {
        self.root.join(encode_path(target)).join(ANALYSIS_DIR)
    }

    /// Location of the artifact for `key`.
    pub fn artifact_path(&self, key: &ArtifactKey) -> PathBuf {
        self.target_dir(&key.target)
            .join(format!("{}.json", encode_segment(&key.analyzer)))
    }
}

/// Encode a target as a relative path. `/` still nests (`owner/repo`), each
/// segment goes through [`encode_segment`], so distinct targets never share
/// a directory and nothing escapes the root.
fn encode_path(raw: &str) -> String {
    raw.split('/').map(encode_segment).collect::<Vec<_>>().join("/")
}

/// Percent-encode one path segment. Bytes outside `[A-Za-z0-9._-]` become
/// `%XX`, a leading `.` is always encoded and the empty segment is `%`.
fn encode_segment(seg: &str) -> String {
    if seg.is_empty() {
        return "%".to_string();
    }
    let mut out = String::with_capacity(seg.len());
    for (i, b) in seg.bytes().enumerate() {
        let plain = b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || (b == b'.' && i > 0);
        if plain {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

impl<F: FileSystem> ArtifactStore for FileArtifactStore<F> {
    fn load(&self, key: &ArtifactKey) -> Result<Option<Artifact>> {
        let path = self.artifact_path(key);
        if !self.fs.is_file(&path) {
            return Ok(None);
        }
        let bytes = self.fs.read(&path)?;
        let artifact: Artifact = serde_json::from_slice(&bytes)
            .with_context(|| format!("decoding artifact {:?}", path))?;
        if artifact.key() != *key {
            warn!(artifact = %key, found = %artifact.key(), path = ?path, "artifact file holds another key; ignoring");
            return Ok(None);
        }
        Ok(Some(artifact))
    }

    fn save(&mut self, artifact: &Artifact) -> Result<()> {
        let key = artifact.key();
        let path = self.artifact_path(&key);
        let tmp = path.with_extension("json.tmp");

        let bytes = serde_json::to_vec_pretty(artifact)
            .with_context(|| format!("encoding artifact {key}"))?;
        self.fs.write(&tmp, &bytes)?;
        self.fs.rename(&tmp, &path)?;

        info!(artifact = %key, digest = %artifact.digest, "stored artifact (file)");
        Ok(())
    }

    fn remove(&mut self, key: &ArtifactKey) -> Result<bool> {
        let path = self.artifact_path(key);
        if !self.fs.is_file(&path) {
            return Ok(false);
        }
        self.fs.remove_file(&path)?;
        debug!(artifact = %key, "removed artifact (file)");
        Ok(true)
    }

    fn remove_target(&mut self, target: &str) -> Result<usize> {
        let dir = self.target_dir(target);
        if !self.fs.exists(&dir) {
            return Ok(0);
        }
        let mut removed = 0;
        for path in self.fs.read_dir(&dir)? {
            if path.extension().is_some_and(|ext| ext == "json") && self.fs.is_file(&path) {
                self.fs.remove_file(&path)?;
                removed += 1;
            }
        }
        info!(scan_target = %target, removed, "invalidated target artifacts (file)");
        Ok(removed)
    }
}

/// Stores artifacts in memory only.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    map: HashMap<ArtifactKey, Artifact>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn load(&self, key: &ArtifactKey) -> Result<Option<Artifact>> {
        Ok(self.map.get(key).cloned())
    }

    fn save(&mut self, artifact: &Artifact) -> Result<()> {
        let key = artifact.key();
        debug!(artifact = %key, digest = %artifact.digest, "stored artifact (memory)");
        self.map.insert(key, artifact.clone());
        Ok(())
    }

    fn remove(&mut self, key: &ArtifactKey) -> Result<bool> {
        Ok(self.map.remove(key).is_some())
    }

    fn remove_target(&mut self, target: &str) -> Result<usize> {
        let before = self.map.len();
        self.map.retain(|k, _| k.target != target);
        Ok(before - self.map.len())
    }
}
