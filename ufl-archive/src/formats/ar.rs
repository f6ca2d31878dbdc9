// SPDX-License-Identifier: AGPL-3.0-or-later
//! Unix `ar` archives, GNU and BSD flavours
//!
//! Layout: the global magic, then per member a fixed 60-byte text header
//! followed by the data padded to an even length. GNU keeps names longer
//! than 15 bytes in a `//` member and refers to them as `/offset`; BSD
//! stores them as `#1/len` with the name leading the data.

use chrono::{DateTime, Utc};
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::entry::ArchiveEntry;
use crate::format::{missing_member, no_data, AccessMode, ArchiveFormat, ArchiveSource};

const MAGIC: &[u8; 8] = b"!<arch>\n";
const HEADER_LEN: usize = 60;
const TERMINATOR: &[u8; 2] = b"`\n";

/// `ar`, `a` and `deb`
#[derive(Debug, Clone, Copy, Default)]
pub struct ArFormat;

fn corrupt(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

fn text_field(bytes: &[u8]) -> &str {
    std::str::from_utf8(bytes).unwrap_or_default().trim_end()
}

fn numeric_field(bytes: &[u8], radix: u32, what: &str) -> io::Result<u64> {
    let text = text_field(bytes);
    if text.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(text, radix).map_err(|_| corrupt(format!("bad {what} field '{text}'")))
}

/// Fill `buf`, or report `false` when the source ends before the first byte
fn read_header(source: &mut dyn ArchiveSource, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(corrupt("truncated member header")),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

fn is_symbol_table(name: &str) -> bool {
    name == "/" || name == "/SYM64/" || name.starts_with("__.SYMDEF")
}

/// Walk the member headers, skipping the data
fn scan(source: &mut dyn ArchiveSource) -> io::Result<Vec<ArchiveEntry>> {
    let total = source.seek(SeekFrom::End(0))?;
    source.seek(SeekFrom::Start(0))?;
    let mut magic = [0u8; 8];
    if !read_header(source, &mut magic)? || &magic != MAGIC {
        return Err(corrupt("missing !<arch> magic"));
    }

    let mut entries = Vec::new();
    let mut long_names: Vec<u8> = Vec::new();
    let mut position = MAGIC.len() as u64;
    let mut ordinal = 0;
    let mut header = [0u8; HEADER_LEN];

    while read_header(source, &mut header)? {
        if &header[58..60] != TERMINATOR {
            return Err(corrupt(format!("bad header terminator at offset {position}")));
        }
        let raw_name = text_field(&header[0..16]).to_string();
        let mtime = numeric_field(&header[16..28], 10, "mtime")?;
        let mode = numeric_field(&header[40..48], 8, "mode")?;
        let size = numeric_field(&header[48..58], 10, "size")?;

        let mut data_start = position + HEADER_LEN as u64;
        // Sizes come from the header text and are checked before any buffer
        // is sized from them.
        if size > total.saturating_sub(data_start) {
            return Err(corrupt(format!(
                "member at offset {position} claims {size} bytes past the end of the archive"
            )));
        }
        let mut data_len = size;
        let name = if raw_name == "//" {
            long_names = vec![0u8; size as usize];
            source.read_exact(&mut long_names)?;
            None
        } else if let Some(len) = raw_name.strip_prefix("#1/") {
            let len: u64 = len
                .parse()
                .map_err(|_| corrupt(format!("bad BSD name length '{len}'")))?;
            if len > size {
                return Err(corrupt("BSD name longer than member"));
            }
            let mut buf = vec![0u8; len as usize];
            source.read_exact(&mut buf)?;
            data_start += len;
            data_len -= len;
            let name = String::from_utf8_lossy(&buf);
            Some(name.trim_end_matches('\0').to_string())
        } else if is_symbol_table(&raw_name) {
            None
        } else if let Some(offset) = raw_name.strip_prefix('/') {
            let offset: usize = offset
                .parse()
                .map_err(|_| corrupt(format!("bad long name reference '{raw_name}'")))?;
            let tail = long_names
                .get(offset..)
                .ok_or_else(|| corrupt(format!("long name offset {offset} out of range")))?;
            let end = tail
                .iter()
                .position(|&b| b == b'\n')
                .unwrap_or(tail.len());
            let name = String::from_utf8_lossy(&tail[..end]);
            Some(name.trim_end_matches('/').to_string())
        } else {
            Some(raw_name.trim_end_matches('/').to_string())
        };

        if let Some(name) = name.filter(|n| !is_symbol_table(n) && !n.is_empty()) {
            let modified = i64::try_from(mtime)
                .ok()
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
            entries.push(
                ArchiveEntry::file(&name, Some(data_len), ordinal)
                    .with_offset(Some(data_start))
                    .with_modified(modified)
                    .with_mode(u32::try_from(mode).ok()),
            );
        }
        ordinal += 1;

        position += HEADER_LEN as u64 + size + (size & 1);
        source.seek(SeekFrom::Start(position))?;
    }

    Ok(entries)
}

impl ArchiveFormat for ArFormat {
    fn name(&self) -> &str {
        "ar"
    }

    fn extensions(&self) -> &[&str] {
        &["ar", "a", "deb"]
    }

    fn matches_signature(&self, header: &[u8]) -> bool {
        header.starts_with(MAGIC)
    }

    fn access(&self) -> AccessMode {
        AccessMode::Random
    }

    fn read_entries(
        &self,
        source: &mut dyn ArchiveSource,
        _archive_name: &str,
    ) -> io::Result<Vec<ArchiveEntry>> {
        scan(source)
    }

    fn copy_entry(
        &self,
        source: &mut dyn ArchiveSource,
        entry: &ArchiveEntry,
        _archive_name: &str,
        out: &mut dyn Write,
    ) -> io::Result<u64> {
        let (Some(offset), Some(size)) = (entry.offset, entry.size) else {
            return Err(no_data(entry));
        };
        source.seek(SeekFrom::Start(offset))?;
        let copied = io::copy(&mut source.take(size), out)?;
        if copied < size {
            return Err(missing_member(entry));
        }
        Ok(copied)
    }
}
