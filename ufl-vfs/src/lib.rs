// SPDX-License-Identifier: AGPL-3.0-or-later
//! Location resolution for the Uniform File Layer
//!
//! Ties the protocol and archive registries together: a [`FileResolver`]
//! takes a location string to a file, descending into archives named along
//! the path. [`UflConfig`] gathers the settings of every layer.

pub mod config;
pub mod resolver;

pub use config::{ArchivePolicy, UflConfig};
pub use resolver::FileResolver;
