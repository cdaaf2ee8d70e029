//! Height of the last committed block.

use crate::db::{DbError, DbOperation, DbValue, Store};

/// What to do with an incoming block height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCheck {
    Process,
    AlreadyProcessed,
    /// The block skips over heights that were never processed.
    Gap { last: u64 },
}

#[derive(Debug, Default)]
pub struct BlockCache {
    last_height: Option<u64>,
}

impl BlockCache {
    pub fn new(last_height: Option<u64>) -> Self {
        Self { last_height }
    }

    pub async fn load(store: &dyn Store) -> Result<Self, DbError> {
        Ok(Self::new(store.latest_block_height().await?))
    }

    pub fn last_height(&self) -> Option<u64> {
        self.last_height
    }

    pub fn check(&self, height: u64) -> BlockCheck {
        match self.last_height {
            Some(last) if height <= last => BlockCheck::AlreadyProcessed,
            Some(last) if height > last + 1 => BlockCheck::Gap { last },
            _ => BlockCheck::Process,
        }
    }

    /// Record a committed block.
    pub fn advance(&mut self, height: u64) {
        self.last_height = Some(height);
    }
}

pub fn insert_block(height: u64, time: u64) -> Result<DbOperation, DbError> {
    let height = i64::try_from(height)
        .map_err(|_| DbError::Unsupported(format!("block height {} exceeds BIGINT", height)))?;
    let time = i64::try_from(time)
        .map_err(|_| DbError::Unsupported(format!("block time {} exceeds BIGINT", time)))?;

    Ok(DbOperation::Insert {
        table: "blocks".to_string(),
        columns: vec!["block_height".to_string(), "time".to_string()],
        values: vec![DbValue::Int64(height), DbValue::Int64(time)],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    #[test]
    fn test_first_block_accepted_at_any_height() {
        assert_eq!(BlockCache::new(None).check(1234), BlockCheck::Process);
    }

    #[test]
    fn test_check_against_last_height() {
        let cache = BlockCache::new(Some(10));
        assert_eq!(cache.check(9), BlockCheck::AlreadyProcessed);
        assert_eq!(cache.check(10), BlockCheck::AlreadyProcessed);
        assert_eq!(cache.check(11), BlockCheck::Process);
        assert_eq!(cache.check(13), BlockCheck::Gap { last: 10 });
    }

    #[tokio::test]
    async fn test_load_reads_committed_height() {
        let store = MemoryStore::new();
        let scope = store.begin().await.unwrap();
        scope.execute(insert_block(41, 1_700_000_000).unwrap()).await.unwrap();
        scope.commit().await.unwrap();

        let cache = BlockCache::load(&store).await.unwrap();
        assert_eq!(cache.last_height(), Some(41));
    }
}
