// SPDX-License-Identifier: AGPL-3.0-or-later
//! The uniform file interface
//!
//! Every backend (local disk, in-memory, pooled remote session, archive
//! root, archive entry) implements [`File`]. Layers only ever talk to the
//! layer below through this trait, so an archive fetched over SFTP and an
//! archive nested inside another archive need no special casing.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Sink, Stream};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use crate::{FileCapabilities, FileMetadata, Location, PermissionBits, UflError, UflResult};

/// Byte stream type
pub type ByteStream = Pin<Box<dyn Stream<Item = UflResult<Bytes>> + Send>>;

/// Byte sink type; closing the sink completes the write
pub type ByteSink = Pin<Box<dyn Sink<Bytes, Error = UflError> + Send>>;

/// A node on some backend
///
/// Files are value-like views: nothing here caches children, and resolving
/// the same location again may produce a fresh instance with fresh metadata.
#[async_trait]
pub trait File: Send + Sync {
    fn location(&self) -> &Location;

    /// The parent is looked up by location, never held.
    fn parent_location(&self) -> Option<Location> {
        self.location().parent()
    }

    fn name(&self) -> Option<&str> {
        self.location().name()
    }

    fn capabilities(&self) -> FileCapabilities;

    async fn metadata(&self) -> UflResult<FileMetadata>;

    /// Children of a container. Order is backend-defined and each call lists
    /// afresh.
    async fn list(&self) -> UflResult<Vec<FileRef>>;

    async fn open_read(&self) -> UflResult<ByteStream>;

    async fn open_write(&self, append: bool) -> UflResult<ByteSink>;

    async fn permissions(&self) -> UflResult<PermissionBits> {
        Ok(self.metadata().await?.permissions)
    }

    async fn set_permissions(&self, _permissions: PermissionBits) -> UflResult<()> {
        Err(unsupported("set permissions", self.location()))
    }

    /// Path on local disk holding exactly this file's bytes, if any
    fn local_path(&self) -> Option<PathBuf> {
        None
    }
}

pub fn unsupported(operation: &str, location: &Location) -> UflError {
    UflError::Unsupported(format!("{operation} on {location}"))
}

/// Shared handle to a file, compared and hashed by location only
#[derive(Clone)]
pub struct FileRef(Arc<dyn File>);

impl FileRef {
    pub fn new(file: impl File + 'static) -> Self {
        Self(Arc::new(file))
    }

    pub fn into_inner(self) -> Arc<dyn File> {
        self.0
    }
}

impl<F: File + 'static> From<Arc<F>> for FileRef {
    fn from(file: Arc<F>) -> Self {
        Self(file)
    }
}

impl From<Arc<dyn File>> for FileRef {
    fn from(file: Arc<dyn File>) -> Self {
        Self(file)
    }
}

impl Deref for FileRef {
    type Target = dyn File;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl PartialEq for FileRef {
    fn eq(&self, other: &Self) -> bool {
        self.location() == other.location()
    }
}

impl Eq for FileRef {}

impl Hash for FileRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.location().hash(state);
    }
}

impl fmt::Debug for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileRef({})", self.location())
    }
}

/// Parameter key for an already-open backend connection
pub const PARAM_CONNECTION: &str = "connection";

/// Parameter key for metadata the caller already holds
pub const PARAM_METADATA: &str = "metadata";

/// Backend-specific values handed to a provider when it instantiates a file
#[derive(Default)]
pub struct InstantiationParams {
    values: HashMap<String, Box<dyn Any + Send>>,
}

impl InstantiationParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Send + 'static>(mut self, key: impl Into<String>, value: T) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert<T: Send + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    /// Remove and return a value of type `T`. A value of another type stays.
    pub fn take<T: Send + 'static>(&mut self, key: &str) -> Option<T> {
        let value = self.values.remove(key)?;
        match value.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(value) => {
                self.values.insert(key.to_string(), value);
                None
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for InstantiationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// Produces files for one scheme
#[async_trait]
pub trait ProtocolProvider: Send + Sync {
    fn scheme(&self) -> &str;

    fn display_name(&self) -> &str;

    async fn get_file(&self, location: &Location, params: InstantiationParams)
        -> UflResult<FileRef>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileKind;
    use std::collections::HashSet;

    struct Stub {
        location: Location,
        size: u64,
    }

    #[async_trait]
    impl File for Stub {
        fn location(&self) -> &Location {
            &self.location
        }

        fn capabilities(&self) -> FileCapabilities {
            FileCapabilities::default()
        }

        async fn metadata(&self) -> UflResult<FileMetadata> {
            Ok(FileMetadata::file(self.size))
        }

        async fn list(&self) -> UflResult<Vec<FileRef>> {
            Err(UflError::NotADirectory(self.location.to_string()))
        }

        async fn open_read(&self) -> UflResult<ByteStream> {
            Err(unsupported("read", &self.location))
        }

        async fn open_write(&self, _append: bool) -> UflResult<ByteSink> {
            Err(unsupported("write", &self.location))
        }
    }

    fn stub(raw: &str, size: u64) -> FileRef {
        FileRef::new(Stub {
            location: Location::parse(raw).unwrap(),
            size,
        })
    }

    #[test]
    fn test_equality_by_location_only() {
        let a = stub("sftp://host:22/a.txt", 1);
        let b = stub("sftp://host/a.txt/", 999);
        let c = stub("sftp://host/b.txt", 1);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<FileRef> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[tokio::test]
    async fn test_default_permissions_and_parent() {
        let f = stub("ftp://host/dir/file", 3);
        assert_eq!(f.parent_location().unwrap(), Location::parse("ftp://host/dir").unwrap());
        assert_eq!(f.name(), Some("file"));
        assert_eq!(f.metadata().await.unwrap().kind, FileKind::Regular);
        assert_eq!(f.permissions().await.unwrap(), PermissionBits::unknown());
        assert!(matches!(
            f.set_permissions(PermissionBits::all()).await,
            Err(UflError::Unsupported(_))
        ));
    }

    #[test]
    fn test_params_take() {
        let mut params = InstantiationParams::new().with(PARAM_METADATA, 42u32);
        assert!(params.take::<String>(PARAM_METADATA).is_none());
        assert!(params.contains(PARAM_METADATA));
        assert_eq!(params.take::<u32>(PARAM_METADATA), Some(42));
        assert!(params.is_empty());
    }
}
