// SPDX-License-Identifier: AGPL-3.0-or-later
//! Keyed connection pool
//!
//! Connections are keyed by [`Location::realm`]. Each realm owns a semaphore
//! sized to `max_connections_per_key` that admits callers, and each pooled
//! connection sits behind its own async mutex. The map lock is only taken for
//! lookup, insert, removal and state changes, and is never held across an
//! await.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex as AsyncMutex, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use ufl_core::{Location, UflError, UflResult};

use crate::config::PoolConfig;
use crate::event::{PoolEvent, PoolEventKind, PoolStats};

const EVENT_CAPACITY: usize = 64;

/// Opens and closes backend sessions for the pool
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: Send + 'static;

    /// Open a session for a realm. Authentication failures must be reported
    /// as [`UflError::Authentication`].
    async fn create(&self, realm: &Location) -> UflResult<Self::Connection>;

    /// Orderly shutdown before the connection is dropped
    async fn close(&self, _connection: &mut Self::Connection) -> UflResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Idle,
    CheckedOut,
    Closed,
}

struct EntryMeta {
    state: EntryState,
    last_used: Instant,
}

struct PoolEntry<C> {
    id: u64,
    key: Location,
    connection: Arc<AsyncMutex<C>>,
    meta: Mutex<EntryMeta>,
}

struct KeySlots<C> {
    permits: Arc<Semaphore>,
    entries: Vec<Arc<PoolEntry<C>>>,
    connecting: usize,
}

impl<C> KeySlots<C> {
    /// No connections, no connect in flight, and no caller holding or
    /// waiting on a permit. Permits and waiters each keep a clone of the
    /// semaphore, and clones are only taken under the map lock.
    fn is_unused(&self) -> bool {
        self.entries.is_empty() && self.connecting == 0 && Arc::strong_count(&self.permits) == 1
    }
}

type SlotMap<C> = HashMap<Location, KeySlots<C>>;

fn slot_mut<'a, C>(slots: &'a mut SlotMap<C>, key: &Location, max: usize) -> &'a mut KeySlots<C> {
    slots.entry(key.clone()).or_insert_with(|| KeySlots {
        permits: Arc::new(Semaphore::new(max)),
        entries: Vec::new(),
        connecting: 0,
    })
}

/// Pool of backend sessions shared by every file on the same realm
pub struct ConnectionPool<F: ConnectionFactory> {
    factory: F,
    config: PoolConfig,
    slots: Mutex<SlotMap<F::Connection>>,
    events: broadcast::Sender<PoolEvent>,
    next_id: AtomicU64,
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    pub fn new(factory: F, config: PoolConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            factory,
            config,
            slots: Mutex::new(HashMap::new()),
            events,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Receive lifecycle events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    /// Borrow a connection for `location`'s realm, connecting if none is idle
    ///
    /// Waits up to `checkout_timeout` while the realm is at capacity. If this
    /// future fails, times out or is dropped, the pool is left as it was.
    pub async fn checkout(self: &Arc<Self>, location: &Location) -> UflResult<PooledConnection<F>> {
        let key = location.realm();
        let permit = self.acquire_permit(&key).await?;

        if let Some((entry, guard)) = self.take_idle(&key) {
            tracing::debug!("Reusing connection {} for {}", entry.id, key);
            self.emit(PoolEventKind::CheckedOut, &entry);
            return Ok(PooledConnection::new(self.clone(), entry, guard, permit));
        }

        let connecting = Connecting::start(self, &key);
        let connection = match timeout(self.config.connect_timeout(), self.factory.create(&key)).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                tracing::debug!("Connecting to {} failed: {}", key, e);
                return Err(e);
            }
            Err(_) => return Err(UflError::ConnectTimeout(key.to_string())),
        };
        drop(connecting);

        Ok(self.insert(key, connection, permit).await)
    }

    /// Return a connection to the pool
    pub fn checkin(&self, handle: PooledConnection<F>) {
        drop(handle);
    }

    /// Close a connection that failed and drop it from the pool
    pub async fn invalidate(&self, mut handle: PooledConnection<F>) {
        let Some(mut guard) = handle.guard.take() else {
            return;
        };
        let entry = handle.entry.clone();
        self.remove(&entry);
        if let Err(e) = self.factory.close(&mut guard).await {
            tracing::warn!("Closing connection {} to {} failed: {}", entry.id, entry.key, e);
        }
        drop(guard);
        tracing::info!("Invalidated connection {} to {}", entry.id, entry.key);
        self.emit(PoolEventKind::Invalidated, &entry);
        drop(handle);
    }

    /// Put an already-open connection into the pool and check it out
    pub async fn adopt(
        self: &Arc<Self>,
        location: &Location,
        mut connection: F::Connection,
    ) -> UflResult<PooledConnection<F>> {
        let key = location.realm();
        let permit = match self.acquire_permit(&key).await {
            Ok(permit) => permit,
            Err(e) => {
                if let Err(close_err) = self.factory.close(&mut connection).await {
                    tracing::warn!("Closing rejected connection to {} failed: {}", key, close_err);
                }
                return Err(e);
            }
        };

        // Stay within the per-realm limit by retiring an idle connection.
        let displaced = {
            let mut slots = self.slots.lock();
            let slot = slot_mut(&mut slots, &key, self.config.max_connections_per_key());
            if slot.entries.len() + slot.connecting >= self.config.max_connections_per_key() {
                take_idle_entry(slot, |_| true)
            } else {
                None
            }
        };
        if let Some((entry, guard)) = displaced {
            self.close_evicted(entry, guard).await;
        }

        Ok(self.insert(key, connection, permit).await)
    }

    /// Close idle connections unused for longer than `idle_timeout`
    ///
    /// Connections that are checked out are never touched. Close failures are
    /// logged and the connection is dropped anyway.
    pub async fn sweep_idle(&self) -> usize {
        let idle_timeout = self.config.idle_timeout();
        let now = Instant::now();
        let mut expired = Vec::new();
        {
            let mut slots = self.slots.lock();
            for slot in slots.values_mut() {
                while let Some(stale) = take_idle_entry(slot, |meta| {
                    now.saturating_duration_since(meta.last_used) >= idle_timeout
                }) {
                    expired.push(stale);
                }
            }
        }

        let count = expired.len();
        for (entry, guard) in expired {
            self.close_evicted(entry, guard).await;
        }
        if count > 0 {
            tracing::debug!("Swept {} idle connections", count);
        }
        self.prune_slots();
        count
    }

    /// Forget realms nothing refers to any more
    fn prune_slots(&self) {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| !slot.is_unused());
        let pruned = before - slots.len();
        if pruned > 0 {
            tracing::debug!("Dropped {} unused realms", pruned);
        }
    }

    /// Run [`sweep_idle`](Self::sweep_idle) every `sweep_interval` until the
    /// pool is dropped
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let pool = Arc::downgrade(self);
        let period = self.config.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(pool) = pool.upgrade() else {
                    break;
                };
                pool.sweep_idle().await;
            }
        })
    }

    /// Close every idle connection and forget the ones in use
    ///
    /// Connections currently checked out are dropped without `close` when
    /// their handle goes away.
    pub async fn close_all(&self) -> usize {
        let mut idle = Vec::new();
        {
            let mut slots = self.slots.lock();
            for slot in slots.values_mut() {
                for entry in slot.entries.drain(..) {
                    entry.meta.lock().state = EntryState::Closed;
                    if let Ok(guard) = entry.connection.clone().try_lock_owned() {
                        idle.push((entry, guard));
                    }
                }
            }
        }

        let count = idle.len();
        for (entry, guard) in idle {
            self.close_evicted(entry, guard).await;
        }
        self.prune_slots();
        count
    }

    pub fn stats(&self) -> PoolStats {
        let slots = self.slots.lock();
        let mut stats = PoolStats::default();
        for slot in slots.values() {
            if slot.entries.is_empty() && slot.connecting == 0 {
                continue;
            }
            stats.keys += 1;
            stats.connecting += slot.connecting;
            for entry in &slot.entries {
                stats.connections += 1;
                match entry.meta.lock().state {
                    EntryState::Idle => stats.idle += 1,
                    EntryState::CheckedOut => stats.checked_out += 1,
                    EntryState::Closed => {}
                }
            }
        }
        stats
    }

    async fn acquire_permit(&self, key: &Location) -> UflResult<OwnedSemaphorePermit> {
        let permits = {
            let mut slots = self.slots.lock();
            slot_mut(&mut slots, key, self.config.max_connections_per_key())
                .permits
                .clone()
        };
        match timeout(self.config.checkout_timeout(), permits.acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(UflError::Cancelled),
            Err(_) => Err(UflError::Timeout(format!("waiting for a connection to {key}"))),
        }
    }

    fn take_idle(
        &self,
        key: &Location,
    ) -> Option<(Arc<PoolEntry<F::Connection>>, OwnedMutexGuard<F::Connection>)> {
        let slots = self.slots.lock();
        let slot = slots.get(key)?;
        for entry in &slot.entries {
            let mut meta = entry.meta.lock();
            if meta.state != EntryState::Idle {
                continue;
            }
            if let Ok(guard) = entry.connection.clone().try_lock_owned() {
                meta.state = EntryState::CheckedOut;
                meta.last_used = Instant::now();
                return Some((entry.clone(), guard));
            }
        }
        None
    }

    async fn insert(
        self: &Arc<Self>,
        key: Location,
        connection: F::Connection,
        permit: OwnedSemaphorePermit,
    ) -> PooledConnection<F> {
        let entry = Arc::new(PoolEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            key,
            connection: Arc::new(AsyncMutex::new(connection)),
            meta: Mutex::new(EntryMeta {
                state: EntryState::CheckedOut,
                last_used: Instant::now(),
            }),
        });
        // Fresh mutex: resolves on first poll.
        let guard = entry.connection.clone().lock_owned().await;
        {
            let mut slots = self.slots.lock();
            slot_mut(&mut slots, &entry.key, self.config.max_connections_per_key())
                .entries
                .push(entry.clone());
        }
        tracing::info!("Opened connection {} to {}", entry.id, entry.key);
        self.emit(PoolEventKind::Created, &entry);
        self.emit(PoolEventKind::CheckedOut, &entry);
        PooledConnection::new(self.clone(), entry, guard, permit)
    }

    fn remove(&self, entry: &PoolEntry<F::Connection>) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(&entry.key) {
            slot.entries.retain(|e| e.id != entry.id);
        }
        entry.meta.lock().state = EntryState::Closed;
    }

    async fn close_evicted(
        &self,
        entry: Arc<PoolEntry<F::Connection>>,
        mut guard: OwnedMutexGuard<F::Connection>,
    ) {
        if let Err(e) = self.factory.close(&mut guard).await {
            tracing::warn!("Closing idle connection {} to {} failed: {}", entry.id, entry.key, e);
        }
        tracing::info!("Closed idle connection {} to {}", entry.id, entry.key);
        self.emit(PoolEventKind::Evicted, &entry);
    }

    fn emit(&self, kind: PoolEventKind, entry: &PoolEntry<F::Connection>) {
        // No subscribers is fine.
        let _ = self.events.send(PoolEvent {
            kind,
            key: entry.key.clone(),
            connection_id: entry.id,
        });
    }
}

/// Remove and lock the first idle entry accepted by `filter`
fn take_idle_entry<C>(
    slot: &mut KeySlots<C>,
    filter: impl Fn(&EntryMeta) -> bool,
) -> Option<(Arc<PoolEntry<C>>, OwnedMutexGuard<C>)> {
    let mut found = None;
    for (index, entry) in slot.entries.iter().enumerate() {
        let mut meta = entry.meta.lock();
        if meta.state != EntryState::Idle || !filter(&*meta) {
            continue;
        }
        if let Ok(guard) = entry.connection.clone().try_lock_owned() {
            meta.state = EntryState::Closed;
            found = Some((index, guard));
            break;
        }
    }
    let (index, guard) = found?;
    Some((slot.entries.remove(index), guard))
}

impl<F: ConnectionFactory> fmt::Debug for ConnectionPool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Tracks an in-flight connect so it shows up in stats and is forgotten if
/// the connect fails or is cancelled
struct Connecting<'a, F: ConnectionFactory> {
    pool: &'a ConnectionPool<F>,
    key: Location,
}

impl<'a, F: ConnectionFactory> Connecting<'a, F> {
    fn start(pool: &'a ConnectionPool<F>, key: &Location) -> Self {
        let mut slots = pool.slots.lock();
        slot_mut(&mut slots, key, pool.config.max_connections_per_key()).connecting += 1;
        Self {
            pool,
            key: key.clone(),
        }
    }
}

impl<F: ConnectionFactory> Drop for Connecting<'_, F> {
    fn drop(&mut self) {
        let mut slots = self.pool.slots.lock();
        if let Some(slot) = slots.get_mut(&self.key) {
            slot.connecting = slot.connecting.saturating_sub(1);
        }
    }
}

/// Exclusive use of a pooled connection; checked back in on drop
pub struct PooledConnection<F: ConnectionFactory> {
    pool: Arc<ConnectionPool<F>>,
    entry: Arc<PoolEntry<F::Connection>>,
    guard: Option<OwnedMutexGuard<F::Connection>>,
    _permit: OwnedSemaphorePermit,
}

impl<F: ConnectionFactory> PooledConnection<F> {
    fn new(
        pool: Arc<ConnectionPool<F>>,
        entry: Arc<PoolEntry<F::Connection>>,
        guard: OwnedMutexGuard<F::Connection>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            pool,
            entry,
            guard: Some(guard),
            _permit: permit,
        }
    }

    pub fn id(&self) -> u64 {
        self.entry.id
    }

    /// Realm the connection belongs to
    pub fn key(&self) -> &Location {
        &self.entry.key
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<F>> {
        &self.pool
    }
}

impl<F: ConnectionFactory> Deref for PooledConnection<F> {
    type Target = F::Connection;

    fn deref(&self) -> &Self::Target {
        self.guard
            .as_deref()
            .expect("connection is held until the handle is dropped")
    }
}

impl<F: ConnectionFactory> DerefMut for PooledConnection<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.guard
            .as_deref_mut()
            .expect("connection is held until the handle is dropped")
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        // The unlock and the state change happen under the map lock so a
        // concurrent checkout never sees an idle entry it cannot lock.
        let checked_in = {
            let _slots = self.pool.slots.lock();
            let mut meta = self.entry.meta.lock();
            let checked_in = meta.state == EntryState::CheckedOut;
            if checked_in {
                meta.state = EntryState::Idle;
                meta.last_used = Instant::now();
            }
            drop(guard);
            checked_in
        };
        if checked_in {
            tracing::debug!("Checked in connection {} to {}", self.entry.id, self.entry.key);
            self.pool.emit(PoolEventKind::CheckedIn, &self.entry);
        }
    }
}

impl<F: ConnectionFactory> fmt::Debug for PooledConnection<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.entry.id)
            .field("key", &self.entry.key)
            .finish()
    }
}
