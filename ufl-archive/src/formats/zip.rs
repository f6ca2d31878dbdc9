// SPDX-License-Identifier: AGPL-3.0-or-later
//! ZIP archives

use chrono::{DateTime, NaiveDate, Utc};
use std::io::{self, Write};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::entry::ArchiveEntry;
use crate::format::{missing_member, no_data, AccessMode, ArchiveFormat, ArchiveSource};

/// `zip` and `jar`, read through the central directory
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipFormat;

fn zip_error(err: ZipError) -> io::Error {
    match err {
        ZipError::Io(e) => e,
        ZipError::FileNotFound => io::Error::new(io::ErrorKind::UnexpectedEof, "member not found"),
        other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
    }
}

fn modified(time: zip::DateTime) -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(time.year().into(), time.month().into(), time.day().into())?
        .and_hms_opt(time.hour().into(), time.minute().into(), time.second().into())
        .map(|naive| naive.and_utc())
}

impl ArchiveFormat for ZipFormat {
    fn name(&self) -> &str {
        "zip"
    }

    fn extensions(&self) -> &[&str] {
        &["zip", "jar"]
    }

    fn matches_signature(&self, header: &[u8]) -> bool {
        infer::archive::is_zip(header)
    }

    fn access(&self) -> AccessMode {
        AccessMode::Random
    }

    fn read_entries(
        &self,
        source: &mut dyn ArchiveSource,
        _archive_name: &str,
    ) -> io::Result<Vec<ArchiveEntry>> {
        let mut archive = ZipArchive::new(source).map_err(zip_error)?;
        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let file = archive.by_index(index).map_err(zip_error)?;
            let entry = if file.is_dir() {
                ArchiveEntry::directory(file.name(), Some(index))
            } else {
                ArchiveEntry::file(file.name(), Some(file.size()), index)
            };
            entries.push(
                entry
                    .with_modified(modified(file.last_modified()))
                    .with_mode(file.unix_mode()),
            );
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
        let index = entry.index.ok_or_else(|| no_data(entry))?;
        let mut archive = ZipArchive::new(source).map_err(zip_error)?;
        if index >= archive.len() {
            return Err(missing_member(entry));
        }
        let mut file = archive.by_index(index).map_err(zip_error)?;
        if file.is_dir() {
            return Err(no_data(entry));
        }
        io::copy(&mut file, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use zip::write::FileOptions;

    fn build_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in files {
            if name.ends_with('/') {
                writer.add_directory(*name, FileOptions::default()).unwrap();
            } else {
                writer
                    .start_file(*name, FileOptions::default().unix_permissions(0o640))
                    .unwrap();
                writer.write_all(data).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_read_entries() {
        let data = build_zip(&[("a.txt", b"alpha"), ("dir/", b""), ("dir/b.txt", b"beta!")]);
        let entries = ZipFormat
            .read_entries(&mut Cursor::new(data), "t.zip")
            .unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].path, "/a.txt");
        assert_eq!(entries[0].size, Some(5));
        assert_eq!(entries[0].mode.map(|m| m & 0o777), Some(0o640));
        assert!(entries[0].modified.is_some());
        assert!(entries[1].is_directory);
        assert_eq!(entries[1].path, "/dir");
        assert_eq!(entries[2].index, Some(2));
    }

    #[test]
    fn test_copy_entry() {
        let data = build_zip(&[("a.txt", b"alpha"), ("b.txt", b"beta")]);
        let mut source = Cursor::new(data);
        let entries = ZipFormat.read_entries(&mut source, "t.zip").unwrap();

        let mut out = Vec::new();
        let n = ZipFormat
            .copy_entry(&mut source, &entries[1], "t.zip", &mut out)
            .unwrap();
        assert_eq!(n, 4);
        assert_eq!(out, b"beta");
    }

    #[test]
    fn test_garbage_is_invalid_data() {
        let err = ZipFormat
            .read_entries(&mut Cursor::new(b"not a zip at all".to_vec()), "t.zip")
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_signature() {
        let data = build_zip(&[("a", b"x")]);
        assert!(ZipFormat.matches_signature(&data));
        assert!(!ZipFormat.matches_signature(b"plain text"));
    }
}
