// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory provider (`mem://volume/path`)
//!
//! Each host name is a separate volume created on first use. Nodes only carry
//! coarse readable/writable flags, so permissions are reported with execute
//! and the owner/group/other split marked as not applicable.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use ufl_core::{
    ByteSink, ByteStream, File, FileCapabilities, FileKind, FileMetadata, FileRef,
    InstantiationParams, Location, PermissionBits, ProtocolProvider, UflError, UflResult,
};

const READ_CHUNK: usize = 16 * 1024;

#[derive(Debug, Clone)]
struct MemNode {
    kind: FileKind,
    data: Bytes,
    readable: bool,
    writable: bool,
    modified: DateTime<Utc>,
}

impl MemNode {
    fn directory() -> Self {
        Self {
            kind: FileKind::Directory,
            data: Bytes::new(),
            readable: true,
            writable: true,
            modified: Utc::now(),
        }
    }

    fn file(data: Bytes) -> Self {
        Self {
            kind: FileKind::Regular,
            data,
            readable: true,
            writable: true,
            modified: Utc::now(),
        }
    }

    fn metadata(&self) -> FileMetadata {
        let base = match self.kind {
            FileKind::Directory => FileMetadata::directory(),
            _ => FileMetadata::file(self.data.len() as u64),
        };
        base.with_modified(self.modified)
            .with_permissions(PermissionBits::combine(self.readable, self.writable, None))
    }
}

/// A tree of in-memory nodes keyed by path segments
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    nodes: RwLock<BTreeMap<Vec<String>, MemNode>>,
}

fn split(path: &str) -> Vec<String> {
    ufl_core::normalize_path(path)
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&self, segments: &[String]) -> Option<MemNode> {
        if segments.is_empty() {
            return Some(MemNode::directory());
        }
        self.nodes.read().get(segments).cloned()
    }

    fn ensure_parents(nodes: &mut BTreeMap<Vec<String>, MemNode>, segments: &[String]) -> UflResult<()> {
        for depth in 1..segments.len() {
            let prefix = segments[..depth].to_vec();
            match nodes.get(&prefix) {
                Some(node) if node.kind != FileKind::Directory => {
                    return Err(UflError::NotADirectory(format!("/{}", prefix.join("/"))));
                }
                Some(_) => {}
                None => {
                    nodes.insert(prefix, MemNode::directory());
                }
            }
        }
        Ok(())
    }

    pub fn create_dir_all(&self, path: &str) -> UflResult<()> {
        let segments = split(path);
        if segments.is_empty() {
            return Ok(());
        }
        let mut nodes = self.nodes.write();
        Self::ensure_parents(&mut nodes, &segments)?;
        match nodes.get(&segments) {
            Some(node) if node.kind != FileKind::Directory => {
                Err(UflError::AlreadyExists(path.to_string()))
            }
            Some(_) => Ok(()),
            None => {
                nodes.insert(segments, MemNode::directory());
                Ok(())
            }
        }
    }

    /// Create or replace a file, creating missing parent directories
    pub fn write_file(&self, path: &str, data: impl Into<Bytes>) -> UflResult<()> {
        let segments = split(path);
        if segments.is_empty() {
            return Err(UflError::NotAFile("/".into()));
        }
        let mut nodes = self.nodes.write();
        Self::ensure_parents(&mut nodes, &segments)?;
        if matches!(nodes.get(&segments), Some(node) if node.kind == FileKind::Directory) {
            return Err(UflError::NotAFile(path.to_string()));
        }
        nodes.insert(segments, MemNode::file(data.into()));
        Ok(())
    }

    pub fn set_flags(&self, path: &str, readable: bool, writable: bool) -> UflResult<()> {
        let segments = split(path);
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(&segments)
            .ok_or_else(|| UflError::NotFound(path.to_string()))?;
        node.readable = readable;
        node.writable = writable;
        Ok(())
    }

    /// Remove a node and everything below it
    pub fn remove(&self, path: &str) -> UflResult<()> {
        let segments = split(path);
        let mut nodes = self.nodes.write();
        if nodes.remove(&segments).is_none() {
            return Err(UflError::NotFound(path.to_string()));
        }
        nodes.retain(|key, _| !key.starts_with(&segments));
        Ok(())
    }

    fn children(&self, segments: &[String]) -> Vec<String> {
        let nodes = self.nodes.read();
        nodes
            .range(segments.to_vec()..)
            .take_while(|(key, _)| key.starts_with(segments))
            .filter(|(key, _)| key.len() == segments.len() + 1)
            .map(|(key, _)| key[segments.len()].clone())
            .collect()
    }

    fn open_for_write(&self, segments: &[String], append: bool) -> UflResult<()> {
        let mut nodes = self.nodes.write();
        let display = format!("/{}", segments.join("/"));
        if segments.is_empty() {
            return Err(UflError::NotAFile(display));
        }
        let parent = &segments[..segments.len() - 1];
        if !parent.is_empty() {
            match nodes.get(parent) {
                None => return Err(UflError::NotFound(format!("/{}", parent.join("/")))),
                Some(node) if node.kind != FileKind::Directory => {
                    return Err(UflError::NotADirectory(format!("/{}", parent.join("/"))));
                }
                Some(_) => {}
            }
        }
        match nodes.get_mut(segments) {
            Some(node) if node.kind == FileKind::Directory => Err(UflError::NotAFile(display)),
            Some(node) if !node.writable => Err(UflError::PermissionDenied(display)),
            Some(node) => {
                if !append {
                    node.data = Bytes::new();
                    node.modified = Utc::now();
                }
                Ok(())
            }
            None => {
                nodes.insert(segments.to_vec(), MemNode::file(Bytes::new()));
                Ok(())
            }
        }
    }

    fn append(&self, segments: &[String], chunk: &[u8]) -> UflResult<()> {
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(segments)
            .ok_or_else(|| UflError::NotFound(format!("/{}", segments.join("/"))))?;
        let mut data = BytesMut::with_capacity(node.data.len() + chunk.len());
        data.extend_from_slice(&node.data);
        data.extend_from_slice(chunk);
        node.data = data.freeze();
        node.modified = Utc::now();
        Ok(())
    }
}

/// Provider for `mem://` locations
#[derive(Debug, Default)]
pub struct MemoryProvider {
    volumes: RwLock<HashMap<String, Arc<MemoryFileSystem>>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// The volume for a host name, created empty on first use
    pub fn volume(&self, name: &str) -> Arc<MemoryFileSystem> {
        if let Some(volume) = self.volumes.read().get(name) {
            return volume.clone();
        }
        self.volumes
            .write()
            .entry(name.to_string())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl ProtocolProvider for MemoryProvider {
    fn scheme(&self) -> &str {
        "mem"
    }

    fn display_name(&self) -> &str {
        "In-Memory"
    }

    async fn get_file(&self, location: &Location, _params: InstantiationParams) -> UflResult<FileRef> {
        Ok(FileRef::new(MemoryFile {
            location: location.clone(),
            fs: self.volume(location.host()),
        }))
    }
}

/// A node in a [`MemoryFileSystem`]
#[derive(Debug, Clone)]
pub struct MemoryFile {
    location: Location,
    fs: Arc<MemoryFileSystem>,
}

impl MemoryFile {
    pub fn new(location: Location, fs: Arc<MemoryFileSystem>) -> Self {
        Self { location, fs }
    }

    fn node(&self) -> UflResult<MemNode> {
        self.fs
            .node(self.location.segments())
            .ok_or_else(|| UflError::NotFound(self.location.to_string()))
    }
}

#[async_trait]
impl File for MemoryFile {
    fn location(&self) -> &Location {
        &self.location
    }

    fn capabilities(&self) -> FileCapabilities {
        FileCapabilities::full()
    }

    async fn metadata(&self) -> UflResult<FileMetadata> {
        Ok(self.node()?.metadata())
    }

    async fn list(&self) -> UflResult<Vec<FileRef>> {
        if self.node()?.kind != FileKind::Directory {
            return Err(UflError::NotADirectory(self.location.to_string()));
        }
        Ok(self
            .fs
            .children(self.location.segments())
            .into_iter()
            .map(|name| {
                FileRef::new(MemoryFile {
                    location: self.location.join(&name),
                    fs: self.fs.clone(),
                })
            })
            .collect())
    }

    async fn open_read(&self) -> UflResult<ByteStream> {
        let node = self.node()?;
        if node.kind == FileKind::Directory {
            return Err(UflError::NotAFile(self.location.to_string()));
        }
        if !node.readable {
            return Err(UflError::PermissionDenied(self.location.to_string()));
        }
        let data = node.data;
        let chunks: Vec<UflResult<Bytes>> = (0..data.len())
            .step_by(READ_CHUNK)
            .map(|start| Ok(data.slice(start..(start + READ_CHUNK).min(data.len()))))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn open_write(&self, append: bool) -> UflResult<ByteSink> {
        let segments = self.location.segments().to_vec();
        self.fs.open_for_write(&segments, append)?;
        let fs = self.fs.clone();
        Ok(Box::pin(futures::sink::unfold(
            (fs, segments),
            |(fs, segments), chunk: Bytes| async move {
                fs.append(&segments, &chunk)?;
                Ok::<_, UflError>((fs, segments))
            },
        )))
    }

    async fn set_permissions(&self, permissions: PermissionBits) -> UflResult<()> {
        self.fs.set_flags(
            &self.location.path(),
            permissions.is_readable(),
            permissions.is_writable(),
        )
    }
}
