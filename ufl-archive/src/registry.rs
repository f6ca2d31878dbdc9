// SPDX-License-Identifier: AGPL-3.0-or-later
//! Archive format registry

use std::sync::Arc;
use ufl_core::stream::read_prefix;
use ufl_core::{File, FileKind, FileRef, UflError, UflResult};

use crate::format::ArchiveFormat;
use crate::formats;
use crate::mount::ArchiveFile;

/// Bytes read from a file when formats are told apart by signature
pub const SIGNATURE_LEN: usize = 512;

/// Known archive formats, in registration order
///
/// A file name picks the format with the longest matching extension, so
/// `x.tar.gz` is a gzipped tar and not a gzip stream. When more than one
/// format claims that extension, or the name has none, the first bytes of
/// the file decide; the earliest registered format breaks remaining ties.
#[derive(Clone)]
pub struct ArchiveRegistry {
    formats: Vec<Arc<dyn ArchiveFormat>>,
    sniff: bool,
}

impl Default for ArchiveRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveRegistry {
    pub fn new() -> Self {
        Self {
            formats: Vec::new(),
            sniff: true,
        }
    }

    /// Registry with every built-in format
    pub fn with_defaults() -> Self {
        Self {
            formats: formats::defaults(),
            sniff: true,
        }
    }

    /// Whether extension-less names and ambiguous extensions are settled by
    /// reading the file's first bytes
    pub fn with_sniffing(mut self, sniff: bool) -> Self {
        self.sniff = sniff;
        self
    }

    pub fn register(&mut self, format: Arc<dyn ArchiveFormat>) -> UflResult<()> {
        if self.formats.iter().any(|f| f.name() == format.name()) {
            return Err(UflError::AlreadyExists(format!(
                "archive format '{}'",
                format.name()
            )));
        }
        tracing::debug!(
            "Registered archive format {} ({})",
            format.name(),
            format.extensions().join(", ")
        );
        self.formats.push(format);
        Ok(())
    }

    pub fn formats(&self) -> &[Arc<dyn ArchiveFormat>] {
        &self.formats
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ArchiveFormat>> {
        self.formats.iter().find(|f| f.name() == name).cloned()
    }

    /// Formats whose longest matching extension is the longest overall
    fn candidates_by_name(&self, file_name: &str) -> Vec<Arc<dyn ArchiveFormat>> {
        let mut best = 0;
        let mut found = Vec::new();
        for format in &self.formats {
            let Some(ext) = format.matched_extension(file_name) else {
                continue;
            };
            if ext.len() > best {
                best = ext.len();
                found.clear();
            }
            if ext.len() == best {
                found.push(format.clone());
            }
        }
        found
    }

    /// Whether some format claims this file name by extension alone
    pub fn claims_name(&self, file_name: &str) -> bool {
        self.formats.iter().any(|f| f.matches_extension(file_name))
    }

    fn has_extension(file_name: &str) -> bool {
        file_name
            .rfind('.')
            .is_some_and(|dot| dot > 0 && dot + 1 < file_name.len())
    }

    /// The format that should open `file`, if any
    ///
    /// Only regular files are archives. A name with an extension no format
    /// claims is never sniffed.
    pub async fn select_format(&self, file: &FileRef) -> UflResult<Option<Arc<dyn ArchiveFormat>>> {
        let name = file.name().unwrap_or_default();
        let candidates = self.candidates_by_name(name);

        let candidates = match candidates.len() {
            1 => return Ok(candidates.into_iter().next()),
            0 if Self::has_extension(name) => return Ok(None),
            0 => self.formats.clone(),
            _ => candidates,
        };
        if candidates.is_empty() {
            return Ok(None);
        }

        let fallback = if Self::has_extension(name) {
            candidates.first().cloned()
        } else {
            None
        };
        if !self.sniff {
            return Ok(fallback);
        }

        let metadata = file.metadata().await?;
        if metadata.kind != FileKind::Regular {
            return Ok(None);
        }
        let header = read_prefix(file.open_read().await?, SIGNATURE_LEN).await?;
        let sniffed = candidates
            .into_iter()
            .find(|format| format.matches_signature(&header));
        if let Some(format) = &sniffed {
            tracing::debug!("Identified {} as {} by signature", file.location(), format.name());
        }
        Ok(sniffed.or(fallback))
    }

    /// Whether some format would open `file`
    ///
    /// Failures reading the file are logged and answer `false`; callers that
    /// must act on them use [`select_format`](Self::select_format).
    pub async fn can_handle(&self, file: &FileRef) -> bool {
        match self.select_format(file).await {
            Ok(format) => format.is_some(),
            Err(e) => {
                tracing::warn!("Could not identify {}: {}", file.location(), e);
                false
            }
        }
    }

    /// Open `file` as an archive
    ///
    /// Entries are indexed on first use, so a corrupt archive surfaces when
    /// it is listed or read rather than here.
    pub async fn mount(&self, file: FileRef) -> UflResult<ArchiveFile> {
        let metadata = file.metadata().await?;
        if metadata.kind != FileKind::Regular {
            return Err(UflError::NotAFile(file.location().to_string()));
        }
        let format = self.select_format(&file).await?.ok_or_else(|| {
            UflError::Unsupported(format!("no archive format for {}", file.location()))
        })?;
        tracing::info!("Mounted {} as {}", file.location(), format.name());
        Ok(ArchiveFile::new(file, format))
    }

    /// Open `file` with a named format, skipping detection
    pub fn mount_as(&self, file: FileRef, format: &str) -> UflResult<ArchiveFile> {
        let format = self
            .get(format)
            .ok_or_else(|| UflError::Unsupported(format!("archive format '{format}'")))?;
        Ok(ArchiveFile::new(file, format))
    }
}

impl std::fmt::Debug for ArchiveRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.formats.iter().map(|f| f.name()).collect();
        f.debug_struct("ArchiveRegistry")
            .field("formats", &names)
            .field("sniff", &self.sniff)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ArchiveEntry;
    use crate::fixtures::{mem_file, tar_gz_bytes, zip_bytes};
    use crate::format::{AccessMode, ArchiveSource};
    use std::io::{self, Write};
    use ufl_core::stream::read_to_bytes;

    /// Claims `.pak` and recognises a one-byte marker
    struct Marked(&'static str, u8);

    impl ArchiveFormat for Marked {
        fn name(&self) -> &str {
            self.0
        }

        fn extensions(&self) -> &[&str] {
            &["pak"]
        }

        fn matches_signature(&self, header: &[u8]) -> bool {
            header.first() == Some(&self.1)
        }

        fn access(&self) -> AccessMode {
            AccessMode::Random
        }

        fn read_entries(&self, _: &mut dyn ArchiveSource, _: &str) -> io::Result<Vec<ArchiveEntry>> {
            Ok(Vec::new())
        }

        fn copy_entry(
            &self,
            _: &mut dyn ArchiveSource,
            _: &ArchiveEntry,
            _: &str,
            _: &mut dyn Write,
        ) -> io::Result<u64> {
            Ok(0)
        }
    }

    async fn selected(registry: &ArchiveRegistry, file: &FileRef) -> Option<String> {
        registry
            .select_format(file)
            .await
            .unwrap()
            .map(|f| f.name().to_string())
    }

    #[tokio::test]
    async fn test_longest_extension_wins() {
        let registry = ArchiveRegistry::with_defaults();
        let file = mem_file("/x.tar.gz", tar_gz_bytes(&[("a", b"1")]));
        assert_eq!(selected(&registry, &file).await.as_deref(), Some("tar.gz"));

        let file = mem_file("/notes.gz", b"not even gzip".to_vec());
        assert_eq!(selected(&registry, &file).await.as_deref(), Some("gz"));
    }

    #[tokio::test]
    async fn test_no_extension_is_sniffed() {
        let registry = ArchiveRegistry::with_defaults();
        let file = mem_file("/download", zip_bytes(&[("a", b"1")]));
        assert_eq!(selected(&registry, &file).await.as_deref(), Some("zip"));

        let file = mem_file("/bundle", tar_gz_bytes(&[("a", b"1")]));
        assert_eq!(selected(&registry, &file).await.as_deref(), Some("tar.gz"));

        let file = mem_file("/readme", b"just text".to_vec());
        assert_eq!(selected(&registry, &file).await, None);
    }

    #[tokio::test]
    async fn test_unclaimed_extension_not_sniffed() {
        let registry = ArchiveRegistry::with_defaults();
        let file = mem_file("/looks.txt", zip_bytes(&[("a", b"1")]));
        assert_eq!(selected(&registry, &file).await, None);
        assert!(!registry.can_handle(&file).await);
    }

    #[tokio::test]
    async fn test_ambiguous_extension_sniffs_then_first_registered() {
        let mut registry = ArchiveRegistry::new();
        registry.register(Arc::new(Marked("first", b'A'))).unwrap();
        registry.register(Arc::new(Marked("second", b'B'))).unwrap();

        let b = mem_file("/data.pak", b"B...".to_vec());
        assert_eq!(selected(&registry, &b).await.as_deref(), Some("second"));

        let neither = mem_file("/data.pak", b"Z...".to_vec());
        assert_eq!(selected(&registry, &neither).await.as_deref(), Some("first"));

        let registry = registry.with_sniffing(false);
        assert_eq!(selected(&registry, &b).await.as_deref(), Some("first"));
    }

    #[test]
    fn test_duplicate_format_rejected() {
        let mut registry = ArchiveRegistry::with_defaults();
        let err = registry
            .register(Arc::new(crate::formats::ZipFormat))
            .unwrap_err();
        assert!(matches!(err, UflError::AlreadyExists(_)));
        assert_eq!(registry.formats().len(), crate::formats::defaults().len());
    }

    #[tokio::test]
    async fn test_mount_and_read() {
        let registry = ArchiveRegistry::with_defaults();
        let archive = registry
            .mount(mem_file("/pkg.zip", zip_bytes(&[("dir/f", b"payload")])))
            .await
            .unwrap();
        assert_eq!(archive.format().name(), "zip");

        let f = archive.entry("/dir/f").await.unwrap();
        let data = read_to_bytes(f.open_read().await.unwrap()).await.unwrap();
        assert_eq!(&data[..], b"payload");
    }

    #[tokio::test]
    async fn test_mount_rejects_non_archives() {
        let registry = ArchiveRegistry::with_defaults();
        let err = registry
            .mount(mem_file("/plain.txt", b"hi".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, UflError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_mount_as_skips_detection() {
        let registry = ArchiveRegistry::with_defaults();
        let archive = registry
            .mount_as(mem_file("/odd.bin", zip_bytes(&[("k", b"v")])), "zip")
            .unwrap();
        assert_eq!(archive.list().await.unwrap().len(), 1);
        assert!(registry.mount_as(mem_file("/x", Vec::new()), "rar").is_err());
    }
}
