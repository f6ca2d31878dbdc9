// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tar archives, plain or wrapped in gzip or xz

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use std::io::{self, Read, Seek, SeekFrom, Write};
use xz2::read::XzDecoder;

use crate::entry::ArchiveEntry;
use crate::format::{missing_member, no_data, AccessMode, ArchiveFormat, ArchiveSource};
use crate::formats::lenient_prefix;

/// Outer compression of a tar stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Xz,
}

/// A tar stream, possibly compressed
///
/// Plain tars record where each member's bytes start, so members are read by
/// seeking. Compressed tars have to be decoded from the beginning.
#[derive(Debug, Clone, Copy)]
pub struct TarFormat {
    compression: Compression,
}

impl TarFormat {
    pub fn new(compression: Compression) -> Self {
        Self { compression }
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    fn decoder<'a>(&self, source: &'a mut dyn ArchiveSource) -> Box<dyn Read + 'a> {
        match self.compression {
            Compression::None => Box::new(source),
            Compression::Gzip => Box::new(GzDecoder::new(source)),
            Compression::Xz => Box::new(XzDecoder::new(source)),
        }
    }
}

fn entry_from_header<R: Read>(
    entry: &tar::Entry<'_, R>,
    index: usize,
) -> io::Result<Option<ArchiveEntry>> {
    let header = entry.header();
    let kind = header.entry_type();
    let path = entry.path()?.to_string_lossy().into_owned();

    let item = if kind.is_dir() {
        ArchiveEntry::directory(&path, Some(index))
    } else if kind.is_file() || kind == tar::EntryType::Continuous {
        ArchiveEntry::file(&path, Some(entry.size()), index)
            .with_offset(Some(entry.raw_file_position()))
    } else {
        // links, devices and fifos have no bytes of their own
        return Ok(None);
    };

    let modified = header
        .mtime()
        .ok()
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
    Ok(Some(
        item.with_modified(modified).with_mode(header.mode().ok()),
    ))
}

impl ArchiveFormat for TarFormat {
    fn name(&self) -> &str {
        match self.compression {
            Compression::None => "tar",
            Compression::Gzip => "tar.gz",
            Compression::Xz => "tar.xz",
        }
    }

    fn extensions(&self) -> &[&str] {
        match self.compression {
            Compression::None => &["tar"],
            Compression::Gzip => &["tar.gz", "tgz"],
            Compression::Xz => &["tar.xz", "txz"],
        }
    }

    fn matches_signature(&self, header: &[u8]) -> bool {
        match self.compression {
            Compression::None => infer::archive::is_tar(header),
            Compression::Gzip => {
                infer::archive::is_gz(header)
                    && infer::archive::is_tar(&lenient_prefix(GzDecoder::new(header), 512))
            }
            Compression::Xz => {
                infer::archive::is_xz(header)
                    && infer::archive::is_tar(&lenient_prefix(XzDecoder::new(header), 512))
            }
        }
    }

    fn access(&self) -> AccessMode {
        match self.compression {
            Compression::None => AccessMode::Random,
            _ => AccessMode::Sequential,
        }
    }

    fn read_entries(
        &self,
        source: &mut dyn ArchiveSource,
        _archive_name: &str,
    ) -> io::Result<Vec<ArchiveEntry>> {
        source.seek(SeekFrom::Start(0))?;
        let mut archive = tar::Archive::new(self.decoder(source));
        let mut entries = Vec::new();
        for (index, entry) in archive.entries()?.enumerate() {
            if let Some(item) = entry_from_header(&entry?, index)? {
                entries.push(item);
            }
        }
        Ok(entries)
    }

    fn copy_entry(
        &self,
        source: &mut dyn ArchiveSource,
        entry: &ArchiveEntry,
        _archive_name: &str,
        out: &mut dyn Write,
    ) -> io::Result<u64> {
        if entry.is_directory {
            return Err(no_data(entry));
        }

        if let (Compression::None, Some(offset), Some(size)) =
            (self.compression, entry.offset, entry.size)
        {
            source.seek(SeekFrom::Start(offset))?;
            let copied = io::copy(&mut source.take(size), out)?;
            if copied < size {
                return Err(missing_member(entry));
            }
            return Ok(copied);
        }

        let index = entry.index.ok_or_else(|| no_data(entry))?;
        source.seek(SeekFrom::Start(0))?;
        let mut archive = tar::Archive::new(self.decoder(source));
        for (position, member) in archive.entries()?.enumerate() {
            let mut member = member?;
            if position == index {
                return io::copy(&mut member, out);
            }
        }
        Err(missing_member(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use std::io::Cursor;
    use xz2::write::XzEncoder;

    fn build_tar<W: Write>(out: W) -> W {
        let mut builder = tar::Builder::new(out);
        let mut dir = tar::Header::new_gnu();
        dir.set_entry_type(tar::EntryType::Directory);
        dir.set_mode(0o755);
        dir.set_size(0);
        dir.set_mtime(1_700_000_000);
        dir.set_cksum();
        builder.append_data(&mut dir, "docs/", io::empty()).unwrap();

        for (name, data) in [("docs/readme.md", &b"# hello"[..]), ("bin/tool", &b"\x7fELF"[..])] {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(1_700_000_000);
            header.set_cksum();
            builder.append_data(&mut header, name, data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn plain() -> Vec<u8> {
        build_tar(Vec::new())
    }

    fn gzipped() -> Vec<u8> {
        build_tar(GzEncoder::new(Vec::new(), flate2::Compression::default()))
            .finish()
            .unwrap()
    }

    fn xzipped() -> Vec<u8> {
        build_tar(XzEncoder::new(Vec::new(), 6)).finish().unwrap()
    }

    fn check_listing(format: TarFormat, data: Vec<u8>) {
        let entries = format.read_entries(&mut Cursor::new(data), "t").unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/docs", "/docs/readme.md", "/bin/tool"]);
        assert!(entries[0].is_directory);
        assert_eq!(entries[1].size, Some(7));
        assert_eq!(entries[1].mode, Some(0o644));
        assert_eq!(
            entries[1].modified.map(|m| m.timestamp()),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn test_plain_listing_and_seek_read() {
        let format = TarFormat::new(Compression::None);
        check_listing(format, plain());

        let mut source = Cursor::new(plain());
        let entries = format.read_entries(&mut source, "t.tar").unwrap();
        assert!(entries[2].offset.is_some());
        let mut out = Vec::new();
        format
            .copy_entry(&mut source, &entries[2], "t.tar", &mut out)
            .unwrap();
        assert_eq!(out, b"\x7fELF");
    }

    #[test]
    fn test_gzip_sequential_read() {
        let format = TarFormat::new(Compression::Gzip);
        assert_eq!(format.access(), AccessMode::Sequential);
        check_listing(format, gzipped());

        let mut source = Cursor::new(gzipped());
        let entries = format.read_entries(&mut source, "t.tgz").unwrap();
        let mut out = Vec::new();
        format
            .copy_entry(&mut source, &entries[1], "t.tgz", &mut out)
            .unwrap();
        assert_eq!(out, b"# hello");
    }

    #[test]
    fn test_xz_listing() {
        check_listing(TarFormat::new(Compression::Xz), xzipped());
    }

    #[test]
    fn test_signatures() {
        let plain_tar = TarFormat::new(Compression::None);
        let gz_tar = TarFormat::new(Compression::Gzip);
        let xz_tar = TarFormat::new(Compression::Xz);

        let tar_head = &plain()[..512];
        assert!(plain_tar.matches_signature(tar_head));
        assert!(!gz_tar.matches_signature(tar_head));

        let gz = gzipped();
        let gz_head = &gz[..gz.len().min(512)];
        assert!(gz_tar.matches_signature(gz_head));
        assert!(!plain_tar.matches_signature(gz_head));

        let xz = xzipped();
        assert!(xz_tar.matches_signature(&xz[..xz.len().min(512)]));
    }

    #[test]
    fn test_not_gzip_fails() {
        let result = TarFormat::new(Compression::Gzip)
            .read_entries(&mut Cursor::new(b"definitely not gzip".to_vec()), "t");
        assert!(result.is_err());
    }
}
