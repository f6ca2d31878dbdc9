// SPDX-License-Identifier: AGPL-3.0-or-later
//! Local filesystem provider (`file://`)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tokio::fs;
use ufl_core::stream::{reader_stream, writer_sink, DEFAULT_CHUNK_SIZE};
use ufl_core::{
    ByteSink, ByteStream, File, FileCapabilities, FileKind, FileMetadata, FileRef,
    InstantiationParams, Location, PermissionBits, ProtocolProvider, UflError, UflResult,
};

/// Provider for `file://` locations
#[derive(Debug, Default)]
pub struct LocalProvider;

impl LocalProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProtocolProvider for LocalProvider {
    fn scheme(&self) -> &str {
        "file"
    }

    fn display_name(&self) -> &str {
        "Local Filesystem"
    }

    async fn get_file(&self, location: &Location, _params: InstantiationParams) -> UflResult<FileRef> {
        Ok(FileRef::new(LocalFile::new(location.clone())?))
    }
}

/// A path on local disk
#[derive(Debug, Clone)]
pub struct LocalFile {
    location: Location,
    path: PathBuf,
}

impl LocalFile {
    pub fn new(location: Location) -> UflResult<Self> {
        if !matches!(location.host(), "" | "localhost") {
            return Err(UflError::Unsupported(format!(
                "file locations on remote host '{}'",
                location.host()
            )));
        }
        let path = location
            .to_local_path()
            .ok_or_else(|| UflError::MalformedLocation(format!("not a local location: {location}")))?;
        Ok(Self { location, path })
    }

    fn io(&self, err: std::io::Error) -> UflError {
        UflError::io_at(err, &self.location)
    }

    async fn stat(&self) -> UflResult<std::fs::Metadata> {
        match fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta),
            // Dangling links still exist as links
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                fs::symlink_metadata(&self.path).await.map_err(|_| self.io(e))
            }
            Err(e) => Err(self.io(e)),
        }
    }
}

fn metadata_from(meta: &std::fs::Metadata) -> FileMetadata {
    let kind = if meta.is_dir() {
        FileKind::Directory
    } else if meta.file_type().is_symlink() {
        FileKind::Symlink
    } else {
        FileKind::Regular
    };

    let mut metadata = match kind {
        FileKind::Directory => FileMetadata::directory(),
        _ => FileMetadata::file(meta.len()),
    };
    metadata.kind = kind;

    if let Ok(modified) = meta.modified() {
        metadata = metadata.with_modified(DateTime::<Utc>::from(modified));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        metadata = metadata.with_permissions(PermissionBits::from_mode(meta.mode()));
    }
    #[cfg(not(unix))]
    {
        metadata = metadata.with_permissions(PermissionBits::combine(
            true,
            !meta.permissions().readonly(),
            None,
        ));
    }

    metadata
}

#[async_trait]
impl File for LocalFile {
    fn location(&self) -> &Location {
        &self.location
    }

    fn capabilities(&self) -> FileCapabilities {
        if cfg!(unix) {
            FileCapabilities::full()
        } else {
            FileCapabilities::read_write()
        }
    }

    async fn metadata(&self) -> UflResult<FileMetadata> {
        Ok(metadata_from(&self.stat().await?))
    }

    async fn list(&self) -> UflResult<Vec<FileRef>> {
        if !self.stat().await?.is_dir() {
            return Err(UflError::NotADirectory(self.location.to_string()));
        }

        let mut children = Vec::new();
        let mut read_dir = fs::read_dir(&self.path).await.map_err(|e| self.io(e))?;
        while let Some(entry) = read_dir.next_entry().await.map_err(|e| self.io(e))? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    tracing::warn!("Skipping non UTF-8 name {:?} in {}", raw, self.location);
                    continue;
                }
            };
            children.push(FileRef::new(LocalFile {
                location: self.location.join(&name),
                path: entry.path(),
            }));
        }
        Ok(children)
    }

    async fn open_read(&self) -> UflResult<ByteStream> {
        if self.stat().await?.is_dir() {
            return Err(UflError::NotAFile(self.location.to_string()));
        }
        let file = fs::File::open(&self.path).await.map_err(|e| self.io(e))?;
        Ok(reader_stream(file, DEFAULT_CHUNK_SIZE, self.location.clone()))
    }

    async fn open_write(&self, append: bool) -> UflResult<ByteSink> {
        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&self.path)
            .await
            .map_err(|e| self.io(e))?;
        Ok(writer_sink(file, self.location.clone()))
    }

    #[cfg(unix)]
    async fn set_permissions(&self, permissions: PermissionBits) -> UflResult<()> {
        use std::os::unix::fs::PermissionsExt;

        let current = self.stat().await?.permissions().mode();
        let mask = u32::from(permissions.mask());
        let mode = (current & 0o777 & !mask) | u32::from(permissions.bits());
        fs::set_permissions(&self.path, std::fs::Permissions::from_mode(mode))
            .await
            .map_err(|e| self.io(e))
    }

    fn local_path(&self) -> Option<PathBuf> {
        Some(self.path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use ufl_core::stream::read_to_bytes;

    fn file_at(path: &std::path::Path) -> LocalFile {
        LocalFile::new(Location::from_local_path(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_read_write_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let file = file_at(&dir.path().join("notes.txt"));

        let mut sink = file.open_write(false).await.unwrap();
        sink.send("hello ".into()).await.unwrap();
        sink.send("world".into()).await.unwrap();
        sink.close().await.unwrap();
        drop(sink);

        let mut sink = file.open_write(true).await.unwrap();
        sink.send("!".into()).await.unwrap();
        sink.close().await.unwrap();
        drop(sink);

        let data = read_to_bytes(file.open_read().await.unwrap()).await.unwrap();
        assert_eq!(&data[..], b"hello world!");

        let meta = file.metadata().await.unwrap();
        assert!(meta.is_file());
        assert_eq!(meta.size, Some(12));
        assert!(meta.modified.is_some());
    }

    #[tokio::test]
    async fn test_list_and_kinds() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let root = file_at(dir.path());
        let mut names: Vec<String> = root
            .list()
            .await
            .unwrap()
            .iter()
            .map(|f| f.name().unwrap().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.txt", "sub"]);

        let child = file_at(&dir.path().join("a.txt"));
        assert!(matches!(child.list().await, Err(UflError::NotADirectory(_))));
        assert!(matches!(root.open_read().await, Err(UflError::NotAFile(_))));
        assert_eq!(child.parent_location().unwrap(), *root.location());
    }

    #[tokio::test]
    async fn test_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let file = file_at(&dir.path().join("missing"));
        assert!(matches!(file.metadata().await, Err(UflError::NotFound(_))));
        assert!(matches!(file.open_read().await, Err(UflError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_chunked_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        std::fs::write(&path, vec![1u8; DEFAULT_CHUNK_SIZE * 2 + 10]).unwrap();

        let chunks: Vec<usize> = file_at(&path)
            .open_read()
            .await
            .unwrap()
            .map(|c| c.unwrap().len())
            .collect()
            .await;
        assert!(chunks.len() >= 3);
        assert_eq!(chunks.iter().sum::<usize>(), DEFAULT_CHUNK_SIZE * 2 + 10);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_permissions() {
        use ufl_core::{Access, Class};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.sh");
        std::fs::write(&path, b"#!/bin/sh").unwrap();
        let file = file_at(&path);

        file.set_permissions(PermissionBits::from_mode(0o750)).await.unwrap();
        let perms = file.permissions().await.unwrap();
        assert_eq!(perms.bits(), 0o750);
        assert_eq!(perms.mask(), 0o777);
        assert!(perms.can(Access::Execute, Class::Group));
        assert!(!perms.can(Access::Read, Class::Other));

        // Bits outside the mask are left alone
        file.set_permissions(PermissionBits::new(0o600, 0o700)).await.unwrap();
        assert_eq!(file.permissions().await.unwrap().bits(), 0o650);
    }

    #[test]
    fn test_remote_host_rejected() {
        let location = Location::parse("file://server/share/x").unwrap();
        assert!(matches!(LocalFile::new(location), Err(UflError::Unsupported(_))));
        let location = Location::parse("file://localhost/tmp").unwrap();
        assert!(LocalFile::new(location).is_ok());
    }

    #[test]
    fn test_local_path_exposed() {
        let dir = tempfile::tempdir().unwrap();
        let file = file_at(dir.path());
        assert_eq!(file.local_path().unwrap(), dir.path());
    }
}
