// SPDX-License-Identifier: AGPL-3.0-or-later
//! Turning location strings into files, through archives at any depth

use std::sync::Arc;
use ufl_archive::{ArchiveFile, ArchiveRegistry};
use ufl_core::{File, FileKind, FileRef, Location, UflResult};
use ufl_providers::ProtocolRegistry;

use crate::config::{ArchivePolicy, UflConfig};

/// Resolves locations whose paths may run into archives
///
/// `file:///srv/pkg.zip/lib/inner.tar.gz/README` reads `README` from a tar
/// inside a zip on local disk. A path segment is only treated as an archive
/// when an archive format claims its name and it turns out to be a regular
/// file; otherwise the path is handed to the protocol as is.
#[derive(Debug, Clone)]
pub struct FileResolver {
    protocols: Arc<ProtocolRegistry>,
    archives: Arc<ArchiveRegistry>,
    policy: ArchivePolicy,
}

impl FileResolver {
    pub fn new(
        protocols: Arc<ProtocolRegistry>,
        archives: Arc<ArchiveRegistry>,
        policy: ArchivePolicy,
    ) -> Self {
        Self {
            protocols,
            archives,
            policy,
        }
    }

    /// Built-in providers and formats, set up from `config`
    pub fn with_defaults(config: &UflConfig) -> Self {
        let archives =
            ArchiveRegistry::with_defaults().with_sniffing(config.archive.sniff_signatures);
        Self::new(
            Arc::new(ProtocolRegistry::with_defaults()),
            Arc::new(archives),
            config.archive.clone(),
        )
    }

    pub fn protocols(&self) -> &Arc<ProtocolRegistry> {
        &self.protocols
    }

    pub fn archives(&self) -> &Arc<ArchiveRegistry> {
        &self.archives
    }

    pub fn policy(&self) -> &ArchivePolicy {
        &self.policy
    }

    pub async fn resolve(&self, raw: &str) -> UflResult<FileRef> {
        self.resolve_location(&Location::parse(raw)?).await
    }

    /// Resolve `location`, mounting every archive named along its path
    ///
    /// A prefix that does not exist or is not a regular file is simply not an
    /// archive. Any other failure, authentication included, ends resolution.
    pub async fn resolve_location(&self, location: &Location) -> UflResult<FileRef> {
        let segments = location.segments();
        for split in 0..segments.len().saturating_sub(1) {
            if !self.archives.claims_name(&segments[split]) {
                continue;
            }
            let prefix = location.with_segments(segments[..=split].to_vec());
            let file = self.protocols.resolve(&prefix).await?;
            if !self.is_regular(&file).await? {
                continue;
            }
            tracing::debug!("Descending into {} for {}", prefix, location);
            let archive = self.archives.mount(file).await?;
            return self.descend(archive, &segments[split + 1..]).await;
        }

        let file = self.protocols.resolve(location).await?;
        self.finish(file).await
    }

    /// Look `rest` up inside `archive`, mounting archives met on the way
    async fn descend(&self, mut archive: ArchiveFile, mut rest: &[String]) -> UflResult<FileRef> {
        'outer: loop {
            for split in 0..rest.len().saturating_sub(1) {
                if !self.archives.claims_name(&rest[split]) {
                    continue;
                }
                let inner = match archive.lookup(&rest[..=split]).await {
                    Ok(inner) => inner,
                    Err(e) if e.is_absent() => continue,
                    Err(e) => return Err(e),
                };
                if self.is_regular(&inner).await? {
                    tracing::debug!("Descending into nested archive {}", inner.location());
                    archive = self.archives.mount(inner).await?;
                    rest = &rest[split + 1..];
                    continue 'outer;
                }
            }
            let file = archive.lookup(rest).await?;
            return self.finish(file).await;
        }
    }

    async fn is_regular(&self, file: &FileRef) -> UflResult<bool> {
        match file.metadata().await {
            Ok(metadata) => Ok(metadata.kind == FileKind::Regular),
            Err(e) if e.is_absent() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Mount the resolved file when the policy asks for it and it is an
    /// archive
    async fn finish(&self, file: FileRef) -> UflResult<FileRef> {
        if !self.policy.auto_mount || !self.is_regular(&file).await? {
            return Ok(file);
        }
        match self.archives.select_format(&file).await? {
            Some(format) => {
                tracing::info!("Mounted {} as {}", file.location(), format.name());
                Ok(FileRef::new(ArchiveFile::new(file, format)))
            }
            None => Ok(file),
        }
    }
}
