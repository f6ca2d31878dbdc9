// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pool lifecycle notifications

use ufl_core::Location;

/// What happened to a pooled connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolEventKind {
    Created,
    CheckedOut,
    CheckedIn,
    /// Closed after a failure reported by its user
    Invalidated,
    /// Closed by the idle sweeper or on shutdown
    Evicted,
}

/// Published on the pool's broadcast channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEvent {
    pub kind: PoolEventKind,
    /// Realm of the connection
    pub key: Location,
    pub connection_id: u64,
}

/// Point-in-time pool occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub keys: usize,
    pub connections: usize,
    pub idle: usize,
    pub checked_out: usize,
    pub connecting: usize,
}
