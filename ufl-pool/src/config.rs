// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pool configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Physical connections allowed per realm
    pub max_connections_per_key: usize,
    pub connect_timeout_secs: u64,
    /// How long a caller waits for a busy realm before giving up
    pub checkout_timeout_secs: u64,
    /// Idle connections older than this are closed by the sweeper
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections_per_key: 1,
            connect_timeout_secs: 10,
            checkout_timeout_secs: 30,
            idle_timeout_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

impl PoolConfig {
    pub fn max_connections_per_key(&self) -> usize {
        self.max_connections_per_key.max(1)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn checkout_timeout(&self) -> Duration {
        Duration::from_secs(self.checkout_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}
