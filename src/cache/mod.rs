//! Process-local entity caches.
//!
//! Each cache mirrors one table. It is filled from the store at start-up
//! (`refresh`), patched by the handler that owns a write right after the
//! write succeeds (`upsert`), and rebuilt from the store after a block rolls
//! back so rolled-back rows never stay visible.

mod entities;

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::db::{DbError, Store};
use crate::types::entities::{Asset, LiquidityTier, Market, PerpetualMarket};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to load {table}: {source}")]
    Load {
        table: &'static str,
        #[source]
        source: DbError,
    },

    #[error("Failed to decode row of {table}: {source}")]
    Decode {
        table: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// A row type that can be mirrored in an [`EntityCache`].
pub trait CachedEntity: Clone + DeserializeOwned + Send + Sync + 'static {
    type Key: Eq + Hash + Clone + Debug + Send + Sync;

    /// Table the rows are loaded from.
    const TABLE: &'static str;

    fn key(&self) -> Self::Key;

    /// Optional second unique key with its own O(1) index.
    fn alternate_key(&self) -> Option<Self::Key> {
        None
    }
}

struct Entries<T: CachedEntity> {
    by_key: HashMap<T::Key, T>,
    by_alternate: HashMap<T::Key, T::Key>,
}

impl<T: CachedEntity> Entries<T> {
    fn new() -> Self {
        Self {
            by_key: HashMap::new(),
            by_alternate: HashMap::new(),
        }
    }

    fn insert(&mut self, row: T) {
        let key = row.key();
        if let Some(previous) = self.by_key.get(&key).and_then(|p| p.alternate_key()) {
            self.by_alternate.remove(&previous);
        }
        if let Some(alternate) = row.alternate_key() {
            self.by_alternate.insert(alternate, key.clone());
        }
        self.by_key.insert(key, row);
    }
}

/// Latest known row per key for one entity type.
pub struct EntityCache<T: CachedEntity> {
    entries: RwLock<Entries<T>>,
}

impl<T: CachedEntity> EntityCache<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Entries::new()),
        }
    }

    pub fn lookup(&self, key: &T::Key) -> Option<T> {
        self.read().by_key.get(key).cloned()
    }

    pub fn lookup_alternate(&self, alternate: &T::Key) -> Option<T> {
        let entries = self.read();
        entries
            .by_alternate
            .get(alternate)
            .and_then(|key| entries.by_key.get(key))
            .cloned()
    }

    /// Record a row that was just written.
    pub fn upsert(&self, row: T) {
        self.write().insert(row);
    }

    /// Drop every entry. Only used for full reinitialisation.
    pub fn clear(&self) {
        *self.write() = Entries::new();
    }

    pub fn len(&self) -> usize {
        self.read().by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn values(&self) -> Vec<T> {
        self.read().by_key.values().cloned().collect()
    }

    /// Replace the contents with the committed rows of the backing table.
    pub async fn refresh(&self, store: &dyn Store) -> Result<usize, CacheError> {
        let rows = store.load_table(T::TABLE).await.map_err(|source| CacheError::Load {
            table: T::TABLE,
            source,
        })?;

        let mut entries = Entries::new();
        for row in rows {
            let row: T = serde_json::from_value(row).map_err(|source| CacheError::Decode {
                table: T::TABLE,
                source,
            })?;
            entries.insert(row);
        }

        let count = entries.by_key.len();
        *self.write() = entries;
        tracing::debug!("Refreshed {} cache with {} entries", T::TABLE, count);
        Ok(count)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Entries<T>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Entries<T>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: CachedEntity> Default for EntityCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityCache<PerpetualMarket> {
    pub fn lookup_by_clob_pair_id(&self, clob_pair_id: i64) -> Option<PerpetualMarket> {
        self.lookup_alternate(&clob_pair_id)
    }
}

/// Every entity cache the handlers read and patch.
#[derive(Default)]
pub struct Caches {
    pub perpetual_markets: EntityCache<PerpetualMarket>,
    pub assets: EntityCache<Asset>,
    pub markets: EntityCache<Market>,
    pub liquidity_tiers: EntityCache<LiquidityTier>,
}

impl Caches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild every cache from committed store state.
    pub async fn refresh_all(&self, store: &dyn Store) -> Result<(), CacheError> {
        let (perpetual_markets, assets, markets, liquidity_tiers) = futures::try_join!(
            self.perpetual_markets.refresh(store),
            self.assets.refresh(store),
            self.markets.refresh(store),
            self.liquidity_tiers.refresh(store),
        )?;

        tracing::info!(
            "Caches loaded: {} perpetual markets, {} assets, {} markets, {} liquidity tiers",
            perpetual_markets,
            assets,
            markets,
            liquidity_tiers
        );
        Ok(())
    }

    pub fn clear_all(&self) {
        self.perpetual_markets.clear();
        self.assets.clear();
        self.markets.clear();
        self.liquidity_tiers.clear();
    }
}
