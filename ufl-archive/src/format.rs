// SPDX-License-Identifier: AGPL-3.0-or-later
//! The contract every archive codec implements

use std::io::{self, Read, Seek, Write};

use crate::entry::ArchiveEntry;

/// Seekable bytes of a whole archive
pub trait ArchiveSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> ArchiveSource for T {}

/// How a format reaches one entry's bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Seek straight to the entry
    Random,
    /// Decode and skip every preceding entry
    Sequential,
}

/// A synchronous archive codec
///
/// Codecs run on the blocking pool. They report malformed input as
/// `InvalidData`, `InvalidInput`, `UnexpectedEof` or `Other` io errors, which
/// the mount turns into corrupt-archive errors naming the archive and entry.
pub trait ArchiveFormat: Send + Sync {
    fn name(&self) -> &str;

    /// Lower-case extensions without the leading dot, e.g. `tar.gz`
    fn extensions(&self) -> &[&str];

    /// The longest of this format's extensions that `file_name` ends with
    fn matched_extension(&self, file_name: &str) -> Option<&str> {
        let lower = file_name.to_ascii_lowercase();
        self.extensions()
            .iter()
            .copied()
            .filter(|ext| {
                lower.len() > ext.len() + 1
                    && lower.ends_with(ext)
                    && lower.as_bytes()[lower.len() - ext.len() - 1] == b'.'
            })
            .max_by_key(|ext| ext.len())
    }

    fn matches_extension(&self, file_name: &str) -> bool {
        self.matched_extension(file_name).is_some()
    }

    /// Whether the first bytes of a file (up to 512) look like this format
    fn matches_signature(&self, _header: &[u8]) -> bool {
        false
    }

    fn access(&self) -> AccessMode;

    /// Every member in container order. `archive_name` is the file name of
    /// the archive itself, for formats whose single entry is named after it.
    fn read_entries(
        &self,
        source: &mut dyn ArchiveSource,
        archive_name: &str,
    ) -> io::Result<Vec<ArchiveEntry>>;

    /// Write one member's bytes to `out`, returning how many were written
    fn copy_entry(
        &self,
        source: &mut dyn ArchiveSource,
        entry: &ArchiveEntry,
        archive_name: &str,
        out: &mut dyn Write,
    ) -> io::Result<u64>;
}

/// Error for an entry that has no stored bytes
pub(crate) fn no_data(entry: &ArchiveEntry) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("{} has no stored data", entry.path),
    )
}

/// Error for an entry that vanished between listing and reading
pub(crate) fn missing_member(entry: &ArchiveEntry) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("member {} not found in container", entry.path),
    )
}
