// SPDX-License-Identifier: AGPL-3.0-or-later
//! Built-in archive formats

pub mod ar;
pub mod compressed;
pub mod tar;
pub mod zip;

use std::io::{self, Read};
use std::sync::Arc;

use crate::format::ArchiveFormat;

pub use self::ar::ArFormat;
pub use self::compressed::{Codec, CompressedFormat};
pub use self::tar::{Compression, TarFormat};
pub use self::zip::ZipFormat;

/// Every built-in format in registration order
///
/// Compressed tars come before the bare compressions so that sniffing an
/// extension-less `.tar.gz` opens the tar rather than the gzip stream.
pub fn defaults() -> Vec<Arc<dyn ArchiveFormat>> {
    vec![
        Arc::new(TarFormat::new(Compression::Gzip)),
        Arc::new(TarFormat::new(Compression::Xz)),
        Arc::new(TarFormat::new(Compression::None)),
        Arc::new(ZipFormat),
        Arc::new(CompressedFormat::new(Codec::Gzip)),
        Arc::new(CompressedFormat::new(Codec::Xz)),
        Arc::new(ArFormat),
    ]
}

/// Read up to `limit` bytes, keeping whatever arrived before an error
pub(crate) fn lenient_prefix(mut reader: impl Read, limit: usize) -> Vec<u8> {
    let mut buf = vec![0u8; limit];
    let mut filled = 0;
    while filled < limit {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    buf.truncate(filled);
    buf
}
