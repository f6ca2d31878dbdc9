// SPDX-License-Identifier: AGPL-3.0-or-later
//! Single compressed streams presented as one-entry archives

use flate2::read::MultiGzDecoder;
use std::io::{self, Read, Seek, SeekFrom, Write};
use xz2::read::XzDecoder;

use crate::entry::ArchiveEntry;
use crate::format::{no_data, AccessMode, ArchiveFormat, ArchiveSource};
use crate::formats::lenient_prefix;

/// Compression of a bare stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Gzip,
    Xz,
}

/// A `.gz` or `.xz` file holding one entry named after the archive
///
/// The uncompressed size is not known without decoding everything, so the
/// entry reports none.
#[derive(Debug, Clone, Copy)]
pub struct CompressedFormat {
    codec: Codec,
}

impl CompressedFormat {
    pub fn new(codec: Codec) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    fn decoder<'a>(&self, source: &'a mut dyn ArchiveSource) -> Box<dyn Read + 'a> {
        match self.codec {
            Codec::Gzip => Box::new(MultiGzDecoder::new(source)),
            Codec::Xz => Box::new(XzDecoder::new(source)),
        }
    }

    /// `notes.txt.gz` holds `notes.txt`
    pub fn entry_name(&self, archive_name: &str) -> String {
        match self.matched_extension(archive_name) {
            Some(ext) => archive_name[..archive_name.len() - ext.len() - 1].to_string(),
            None => archive_name.to_string(),
        }
    }
}

impl ArchiveFormat for CompressedFormat {
    fn name(&self) -> &str {
        match self.codec {
            Codec::Gzip => "gz",
            Codec::Xz => "xz",
        }
    }

    fn extensions(&self) -> &[&str] {
        match self.codec {
            Codec::Gzip => &["gz"],
            Codec::Xz => &["xz"],
        }
    }

    fn matches_signature(&self, header: &[u8]) -> bool {
        match self.codec {
            Codec::Gzip => infer::archive::is_gz(header),
            Codec::Xz => infer::archive::is_xz(header),
        }
    }

    fn access(&self) -> AccessMode {
        AccessMode::Sequential
    }

    fn read_entries(
        &self,
        source: &mut dyn ArchiveSource,
        archive_name: &str,
    ) -> io::Result<Vec<ArchiveEntry>> {
        source.seek(SeekFrom::Start(0))?;
        let header = lenient_prefix(&mut *source, 6);
        if !self.matches_signature(&header) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("not a {} stream", self.name()),
            ));
        }
        Ok(vec![ArchiveEntry::file(&self.entry_name(archive_name), None, 0)])
    }

    fn copy_entry(
        &self,
        source: &mut dyn ArchiveSource,
        entry: &ArchiveEntry,
        _archive_name: &str,
        out: &mut dyn Write,
    ) -> io::Result<u64> {
        if entry.index != Some(0) {
            return Err(no_data(entry));
        }
        source.seek(SeekFrom::Start(0))?;
        io::copy(&mut self.decoder(source), out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use std::io::Cursor;
    use xz2::write::XzEncoder;

    fn gz(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_entry_named_after_archive() {
        let format = CompressedFormat::new(Codec::Gzip);
        let entries = format
            .read_entries(&mut Cursor::new(gz(b"hello")), "notes.txt.GZ")
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "/notes.txt");
        assert_eq!(entries[0].size, None);
        assert!(!entries[0].is_directory);
    }

    #[test]
    fn test_gzip_members_concatenate() {
        let mut data = gz(b"hello ");
        data.extend(gz(b"world"));
        let format = CompressedFormat::new(Codec::Gzip);
        let mut source = Cursor::new(data);
        let entries = format.read_entries(&mut source, "x.gz").unwrap();

        let mut out = Vec::new();
        format
            .copy_entry(&mut source, &entries[0], "x.gz", &mut out)
            .unwrap();
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn test_xz_round_trip() {
        let mut encoder = XzEncoder::new(Vec::new(), 6);
        encoder.write_all(b"compressed bytes").unwrap();
        let data = encoder.finish().unwrap();

        let format = CompressedFormat::new(Codec::Xz);
        let mut source = Cursor::new(data);
        let entries = format.read_entries(&mut source, "log.xz").unwrap();
        assert_eq!(entries[0].path, "/log");

        let mut out = Vec::new();
        format
            .copy_entry(&mut source, &entries[0], "log.xz", &mut out)
            .unwrap();
        assert_eq!(out, b"compressed bytes");
    }

    #[test]
    fn test_wrong_magic_is_invalid_data() {
        let format = CompressedFormat::new(Codec::Xz);
        let err = format
            .read_entries(&mut Cursor::new(gz(b"x")), "x.xz")
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
