// SPDX-License-Identifier: AGPL-3.0-or-later
//! Archive files and the entries inside them

use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use tokio::sync::OnceCell;
use ufl_core::{
    normalize_path, unsupported, ByteSink, ByteStream, File, FileCapabilities, FileMetadata,
    FileRef, Location, PermissionBits, UflError, UflResult,
};

use crate::entry::{ArchiveEntry, EntryTree};
use crate::format::ArchiveFormat;
use crate::spool::{blocking_stream, Spool};

/// Map a codec failure to the error callers see
pub fn codec_error(err: io::Error, archive: &Location, entry: Option<&str>) -> UflError {
    use io::ErrorKind;
    match err.kind() {
        ErrorKind::InvalidData
        | ErrorKind::InvalidInput
        | ErrorKind::UnexpectedEof
        | ErrorKind::Other => UflError::CorruptArchive {
            archive: archive.to_string(),
            entry: entry.map(str::to_string),
            message: err.to_string(),
        },
        _ => UflError::io_at(err, archive),
    }
}

struct MountState {
    spool: Spool,
    tree: EntryTree,
}

struct Mount {
    source: FileRef,
    format: Arc<dyn ArchiveFormat>,
    archive_name: String,
    state: OnceCell<Arc<MountState>>,
}

impl Mount {
    fn location(&self) -> &Location {
        self.source.location()
    }

    /// Spool and index the archive, once per mount
    async fn state(&self) -> UflResult<Arc<MountState>> {
        self.state
            .get_or_try_init(|| async {
                let spool = Spool::fill(&self.source).await?;
                let mut reader = spool.open()?;
                let format = self.format.clone();
                let archive_name = self.archive_name.clone();
                let entries = tokio::task::spawn_blocking(move || {
                    format.read_entries(&mut reader, &archive_name)
                })
                .await
                .map_err(io::Error::from)?
                .map_err(|e| codec_error(e, self.location(), None))?;

                let tree = EntryTree::build(entries);
                tracing::debug!(
                    "Indexed {} entries of {} as {}",
                    tree.len(),
                    self.location(),
                    self.format.name()
                );
                Ok::<_, UflError>(Arc::new(MountState { spool, tree }))
            })
            .await
            .cloned()
    }
}

/// An archive opened as a directory tree
///
/// The archive keeps its own location and metadata; listing it lists the
/// entries at the archive root. Mounts are read-only.
#[derive(Clone)]
pub struct ArchiveFile {
    mount: Arc<Mount>,
}

impl ArchiveFile {
    pub fn new(source: FileRef, format: Arc<dyn ArchiveFormat>) -> Self {
        let archive_name = source.name().unwrap_or("archive").to_string();
        Self {
            mount: Arc::new(Mount {
                source,
                format,
                archive_name,
                state: OnceCell::new(),
            }),
        }
    }

    pub fn format(&self) -> &Arc<dyn ArchiveFormat> {
        &self.mount.format
    }

    /// The file the archive was read from
    pub fn source(&self) -> &FileRef {
        &self.mount.source
    }

    /// Every entry, synthesized directories included
    pub async fn entries(&self) -> UflResult<Vec<ArchiveEntry>> {
        Ok(self.mount.state().await?.tree.entries().to_vec())
    }

    /// Look up a path inside the archive; the empty path is the archive
    /// itself
    pub async fn lookup(&self, segments: &[String]) -> UflResult<FileRef> {
        if segments.is_empty() {
            return Ok(FileRef::new(self.clone()));
        }
        let state = self.mount.state().await?;
        if state.tree.get(segments).is_none() {
            return Err(UflError::NotFound(self.location().join(segments.join("/")).to_string()));
        }
        Ok(FileRef::new(ArchiveEntryFile::new(self.mount.clone(), segments.to_vec())))
    }

    /// Look up a `/`-separated path inside the archive
    pub async fn entry(&self, path: &str) -> UflResult<FileRef> {
        self.lookup(&normalize_path(path)).await
    }
}

impl std::fmt::Debug for ArchiveFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveFile")
            .field("location", self.location())
            .field("format", &self.mount.format.name())
            .finish()
    }
}

fn list_children(mount: &Arc<Mount>, state: &MountState, segments: &[String]) -> Vec<FileRef> {
    state
        .tree
        .children(segments)
        .unwrap_or_default()
        .into_iter()
        .map(|entry| FileRef::new(ArchiveEntryFile::new(mount.clone(), entry.segments())))
        .collect()
}

#[async_trait]
impl File for ArchiveFile {
    fn location(&self) -> &Location {
        self.mount.location()
    }

    fn capabilities(&self) -> FileCapabilities {
        FileCapabilities::read_only()
    }

    async fn metadata(&self) -> UflResult<FileMetadata> {
        let metadata = self.mount.source.metadata().await?;
        let permissions = metadata.permissions.read_only();
        Ok(metadata.with_permissions(permissions))
    }

    async fn list(&self) -> UflResult<Vec<FileRef>> {
        let state = self.mount.state().await?;
        Ok(list_children(&self.mount, &state, &[]))
    }

    /// The raw archive bytes
    async fn open_read(&self) -> UflResult<ByteStream> {
        self.mount.source.open_read().await
    }

    async fn open_write(&self, _append: bool) -> UflResult<ByteSink> {
        Err(unsupported("write into an archive", self.location()))
    }

    fn local_path(&self) -> Option<std::path::PathBuf> {
        self.mount.source.local_path()
    }
}

/// A member of a mounted archive
pub struct ArchiveEntryFile {
    mount: Arc<Mount>,
    segments: Vec<String>,
    location: Location,
}

impl ArchiveEntryFile {
    fn new(mount: Arc<Mount>, segments: Vec<String>) -> Self {
        let location = mount.location().join(segments.join("/"));
        Self {
            mount,
            segments,
            location,
        }
    }

    /// Path inside the archive, starting with `/`
    pub fn entry_path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    async fn entry(&self) -> UflResult<(Arc<MountState>, ArchiveEntry)> {
        let state = self.mount.state().await?;
        let entry = state
            .tree
            .get(&self.segments)
            .cloned()
            .ok_or_else(|| UflError::NotFound(self.location.to_string()))?;
        Ok((state, entry))
    }
}

#[async_trait]
impl File for ArchiveEntryFile {
    fn location(&self) -> &Location {
        &self.location
    }

    fn capabilities(&self) -> FileCapabilities {
        FileCapabilities::read_only()
    }

    async fn metadata(&self) -> UflResult<FileMetadata> {
        let (_, entry) = self.entry().await?;
        let mut metadata = if entry.is_directory {
            FileMetadata::directory()
        } else {
            FileMetadata::file(0).with_size(entry.size)
        };
        if let Some(modified) = entry.modified {
            metadata = metadata.with_modified(modified);
        }
        let permissions = match entry.mode {
            Some(mode) => PermissionBits::from_mode(mode).read_only(),
            None => PermissionBits::combine(true, false, None),
        };
        Ok(metadata.with_permissions(permissions))
    }

    async fn list(&self) -> UflResult<Vec<FileRef>> {
        let (state, entry) = self.entry().await?;
        if !entry.is_directory {
            return Err(UflError::NotADirectory(self.location.to_string()));
        }
        Ok(list_children(&self.mount, &state, &self.segments))
    }

    async fn open_read(&self) -> UflResult<ByteStream> {
        let (state, entry) = self.entry().await?;
        if entry.is_directory {
            return Err(UflError::NotAFile(self.location.to_string()));
        }

        let format = self.mount.format.clone();
        let archive_name = self.mount.archive_name.clone();
        let archive = self.mount.location().clone();
        let entry_path = entry.path.clone();
        tracing::debug!("Reading {} from {} ({:?})", entry_path, archive, format.access());

        Ok(blocking_stream(
            move |out| {
                let mut reader = state.spool.open()?;
                format.copy_entry(&mut reader, &entry, &archive_name, out)
            },
            move |e| codec_error(e, &archive, Some(entry_path.as_str())),
        ))
    }

    async fn open_write(&self, _append: bool) -> UflResult<ByteSink> {
        Err(unsupported("write into an archive", &self.location))
    }
}
