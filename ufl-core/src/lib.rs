// SPDX-License-Identifier: AGPL-3.0-or-later
//! Uniform File Layer Core
//!
//! Locations, the [`File`] trait every backend implements, permission bits,
//! metadata and the shared error type.

pub mod error;
pub mod file;
pub mod location;
pub mod metadata;
pub mod permissions;
pub mod scheme;
pub mod stream;

pub use error::{UflError, UflResult};
pub use file::{
    unsupported, ByteSink, ByteStream, File, FileRef, InstantiationParams, ProtocolProvider,
    PARAM_CONNECTION, PARAM_METADATA,
};
pub use location::{normalize_path, Credentials, Location};
pub use metadata::{FileCapabilities, FileKind, FileMetadata};
pub use permissions::{Access, Class, PermissionBits};
pub use scheme::{default_port, get_scheme, SchemeInfo, SCHEMES};
