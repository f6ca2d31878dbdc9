// SPDX-License-Identifier: AGPL-3.0-or-later
//! Connection pooling for session-based backends
//!
//! Remote backends share one pool per scheme. Sessions are keyed by the
//! location's realm (scheme, credentials, host and port), borrowed for a
//! single operation, and closed by a background sweeper once idle.

pub mod config;
pub mod event;
pub mod pool;

pub use config::PoolConfig;
pub use event::{PoolEvent, PoolEventKind, PoolStats};
pub use pool::{ConnectionFactory, ConnectionPool, PooledConnection};
