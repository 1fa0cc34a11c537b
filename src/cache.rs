/// Block cache (spec C1)
///
/// Bounded mapping from block height to the cached `BlockFingerprint` at
/// that height. Unlike the teacher's `CacheManager`, eviction here is by
/// height floor rather than recency, since the tick controller prunes once
/// per tick with `prune(latest - CACHE_DEPTH + 1)` — a `BTreeMap` makes that
/// a single `retain` over a sorted key space instead of a recency walk.
use std::collections::BTreeMap;

use tokio::sync::RwLock;

use crate::types::BlockFingerprint;

pub struct BlockCache {
    entries: RwLock<BTreeMap<u64, BlockFingerprint>>,
}

impl BlockCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn get(&self, height: u64) -> Option<BlockFingerprint> {
        self.entries.read().await.get(&height).cloned()
    }

    /// Unconditional overwrite; used both for fresh inserts and replacements.
    pub async fn put(&self, height: u64, fingerprint: BlockFingerprint) {
        self.entries.write().await.insert(height, fingerprint);
    }

    /// Deletes every entry with height < floor. Does not enforce the
    /// `CACHE_DEPTH` size bound by itself — the tick controller calls this
    /// once per tick after the size bound is known (`latest_height`).
    pub async fn prune(&self, floor: u64) {
        self.entries.write().await.retain(|h, _| *h >= floor);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Snapshot of the cached heights, e.g. for a health-check surface or
    /// test assertions on pruning behavior.
    pub async fn heights(&self) -> Vec<u64> {
        self.entries.read().await.keys().copied().collect()
    }
}

impl Default for BlockCache {
    fn default() -> Self {
        Self::new()
    }
}
