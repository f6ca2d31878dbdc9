// SPDX-License-Identifier: AGPL-3.0-or-later
//! File and directory metadata

use crate::PermissionBits;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
}

/// Snapshot of a node's attributes
///
/// Metadata is a snapshot, not identity: two files with the same location
/// are equal whatever their metadata says.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub kind: FileKind,
    /// `None` when the backend cannot know it without reading everything
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
    pub permissions: PermissionBits,
}

impl FileMetadata {
    pub fn file(size: u64) -> Self {
        Self {
            kind: FileKind::Regular,
            size: Some(size),
            modified: None,
            permissions: PermissionBits::unknown(),
        }
    }

    pub fn directory() -> Self {
        Self {
            kind: FileKind::Directory,
            size: None,
            modified: None,
            permissions: PermissionBits::unknown(),
        }
    }

    pub fn with_size(mut self, size: Option<u64>) -> Self {
        self.size = size;
        self
    }

    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn with_permissions(mut self, permissions: PermissionBits) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::Regular
    }

    pub fn is_directory(&self) -> bool {
        self.kind == FileKind::Directory
    }
}

/// What a file supports, known without any I/O
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileCapabilities {
    pub list: bool,
    pub read: bool,
    pub write: bool,
    pub set_permissions: bool,
}

impl FileCapabilities {
    pub fn read_only() -> Self {
        Self {
            list: true,
            read: true,
            ..Default::default()
        }
    }

    pub fn read_write() -> Self {
        Self {
            list: true,
            read: true,
            write: true,
            set_permissions: false,
        }
    }

    pub fn full() -> Self {
        Self {
            set_permissions: true,
            ..Self::read_write()
        }
    }
}
