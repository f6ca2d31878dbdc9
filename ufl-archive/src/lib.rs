// SPDX-License-Identifier: AGPL-3.0-or-later
//! Archive mounting for the Uniform File Layer
//!
//! An [`ArchiveRegistry`] picks an [`ArchiveFormat`] for a file and mounts
//! it as an [`ArchiveFile`], whose entries are ordinary [`ufl_core::File`]s.
//! Codecs are synchronous and run on the blocking pool; sources that are not
//! on local disk are spooled to a temporary file first.

pub mod entry;
pub mod format;
pub mod formats;
pub mod mount;
pub mod registry;
pub mod spool;

pub use entry::{canonical_path, ArchiveEntry, EntryTree};
pub use format::{AccessMode, ArchiveFormat, ArchiveSource};
pub use mount::{codec_error, ArchiveEntryFile, ArchiveFile};
pub use registry::{ArchiveRegistry, SIGNATURE_LEN};
pub use spool::{blocking_stream, Spool};
