// SPDX-License-Identifier: AGPL-3.0-or-later
//! Archive entries and the navigable tree built from them

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use ufl_core::normalize_path;

/// One member of an archive as reported by its format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path inside the archive, always starting with `/`
    pub path: String,
    /// `None` when the container does not record it
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
    pub is_directory: bool,
    pub mode: Option<u32>,
    /// Ordinal in the container's own listing; `None` for synthesized
    /// directories
    pub index: Option<usize>,
    /// Start of the stored bytes, for formats that can seek straight to them
    pub offset: Option<u64>,
}

impl ArchiveEntry {
    pub fn file(path: &str, size: Option<u64>, index: usize) -> Self {
        Self {
            path: canonical_path(path),
            size,
            modified: None,
            is_directory: false,
            mode: None,
            index: Some(index),
            offset: None,
        }
    }

    pub fn directory(path: &str, index: Option<usize>) -> Self {
        Self {
            path: canonical_path(path),
            size: None,
            modified: None,
            is_directory: true,
            mode: None,
            index,
            offset: None,
        }
    }

    pub fn with_modified(mut self, modified: Option<DateTime<Utc>>) -> Self {
        self.modified = modified;
        self
    }

    pub fn with_mode(mut self, mode: Option<u32>) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_offset(mut self, offset: Option<u64>) -> Self {
        self.offset = offset;
        self
    }

    pub fn segments(&self) -> Vec<String> {
        normalize_path(&self.path)
    }

    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }
}

/// `/a/b` form of a raw member name such as `./a//b/`
pub fn canonical_path(raw: &str) -> String {
    format!("/{}", normalize_path(raw).join("/"))
}

/// Entries indexed by path with every ancestor directory present
///
/// Archives are free to list `dir/b.txt` without ever listing `dir`. Missing
/// ancestors are synthesized here so every entry can be reached by walking
/// down from the root. When a path repeats, the later member wins but keeps
/// the position of the first. A path that is both a member and the parent of
/// other members is a directory; the clashing file member is dropped.
#[derive(Debug, Default)]
pub struct EntryTree {
    entries: Vec<ArchiveEntry>,
    by_path: HashMap<Vec<String>, usize>,
    children: HashMap<Vec<String>, Vec<usize>>,
}

impl EntryTree {
    pub fn build(raw: impl IntoIterator<Item = ArchiveEntry>) -> Self {
        let mut tree = Self::default();
        for entry in raw {
            let segments = entry.segments();
            if segments.is_empty() {
                continue;
            }
            for depth in 1..segments.len() {
                let ancestor = &segments[..depth];
                let is_directory = tree.get(ancestor).map(|e| e.is_directory);
                if is_directory == Some(true) {
                    continue;
                }
                let path = format!("/{}", ancestor.join("/"));
                if is_directory == Some(false) {
                    tracing::warn!("Archive member {} is also a directory; dropping the file", path);
                }
                tree.insert(ancestor.to_vec(), ArchiveEntry::directory(&path, None));
            }
            let path = format!("/{}", segments.join("/"));
            if !entry.is_directory && tree.children.get(&segments).is_some_and(|c| !c.is_empty()) {
                tracing::warn!("Archive member {} shadows a directory; skipping it", path);
                continue;
            }
            tree.insert(segments, ArchiveEntry { path, ..entry });
        }
        tree
    }

    fn insert(&mut self, segments: Vec<String>, entry: ArchiveEntry) {
        if let Some(&slot) = self.by_path.get(&segments) {
            self.entries[slot] = entry;
            return;
        }
        let slot = self.entries.len();
        self.entries.push(entry);
        let parent = segments[..segments.len() - 1].to_vec();
        self.children.entry(parent).or_default().push(slot);
        self.by_path.insert(segments, slot);
    }

    /// Exact lookup; the root is not an entry
    pub fn get(&self, segments: &[String]) -> Option<&ArchiveEntry> {
        self.by_path.get(segments).map(|&slot| &self.entries[slot])
    }

    /// Direct children in archive order; `None` when `segments` is neither
    /// the root nor a directory
    pub fn children(&self, segments: &[String]) -> Option<Vec<&ArchiveEntry>> {
        if !segments.is_empty() && !self.get(segments)?.is_directory {
            return None;
        }
        Some(
            self.children
                .get(segments)
                .map(|slots| slots.iter().map(|&slot| &self.entries[slot]).collect())
                .unwrap_or_default(),
        )
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
