// SPDX-License-Identifier: AGPL-3.0-or-later
//! Protocol providers for the Uniform File Layer
//!
//! A [`ProtocolRegistry`] maps location schemes to providers. Built in are
//! the local filesystem (`file`), an in-memory tree (`mem`) and a generic
//! pooled provider that wire clients plug into through [`RemoteSession`].

pub mod local;
pub mod memory;
pub mod registry;
pub mod remote;

pub use local::{LocalFile, LocalProvider};
pub use memory::{MemoryFile, MemoryFileSystem, MemoryProvider};
pub use registry::ProtocolRegistry;
pub use remote::{RemoteConfig, RemoteEntry, RemoteFile, RemoteProvider, RemoteSession, WriteMode};
