use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::record::ChunkRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Containers kept per resolution; retirements beyond this are released.
    pub max_per_bucket: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_per_bucket: 64 }
    }
}

/// Retired chunk containers, one stack per resolution.
#[derive(Debug, Default)]
pub struct ChunkPool {
    buckets: BTreeMap<u32, Vec<ChunkRecord>>,
    max_per_bucket: usize,
}

impl ChunkPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            buckets: BTreeMap::new(),
            max_per_bucket: config.max_per_bucket,
        }
    }

    /// Push a reset record. Hands it back when its bucket is full.
    pub fn push(&mut self, record: ChunkRecord) -> Option<ChunkRecord> {
        let bucket = self.buckets.entry(record.lod_resolution()).or_default();
        if bucket.len() >= self.max_per_bucket {
            return Some(record);
        }
        bucket.push(record);
        None
    }

    pub fn pop(&mut self, resolution: u32) -> Option<ChunkRecord> {
        self.buckets.get_mut(&resolution)?.pop()
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bucket_len(&self, resolution: u32) -> usize {
        self.buckets.get(&resolution).map_or(0, Vec::len)
    }

    /// Remove every pooled record.
    pub fn drain(&mut self) -> Vec<ChunkRecord> {
        std::mem::take(&mut self.buckets)
            .into_values()
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;
    use crate::desired::DesiredChunk;
    use crate::factory::ResourceHandle;
    use terrastream_common::ChunkCoord;
    use terrastream_origin::FloatingOrigin;

    fn record(handle: u64, distance: i64) -> ChunkRecord {
        let cfg = StreamConfig::default();
        let origin = FloatingOrigin::new(cfg.chunk_size, cfg.origin_threshold);
        let desc = DesiredChunk::base(&cfg, &origin, ChunkCoord::new(handle as i64, 0), distance);
        ChunkRecord::new(ResourceHandle(handle), desc)
    }

    #[test]
    fn pop_returns_same_resolution_lifo() {
        let mut pool = ChunkPool::new(PoolConfig::default());
        assert!(pool.push(record(1, 0)).is_none());
        assert!(pool.push(record(2, 0)).is_none());
        assert!(pool.push(record(3, 5)).is_none());

        assert_eq!(pool.len(), 3);
        assert_eq!(pool.bucket_len(129), 2);
        assert_eq!(pool.pop(129).unwrap().resources(), ResourceHandle(2));
        assert_eq!(pool.pop(33).unwrap().resources(), ResourceHandle(3));
        assert!(pool.pop(33).is_none());
        assert!(pool.pop(17).is_none());
    }

    #[test]
    fn full_bucket_hands_record_back() {
        let mut pool = ChunkPool::new(PoolConfig { max_per_bucket: 1 });
        assert!(pool.push(record(1, 0)).is_none());
        let rejected = pool.push(record(2, 0)).unwrap();
        assert_eq!(rejected.resources(), ResourceHandle(2));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn drain_empties_every_bucket() {
        let mut pool = ChunkPool::new(PoolConfig::default());
        pool.push(record(1, 0));
        pool.push(record(2, 9));
        assert_eq!(pool.drain().len(), 2);
        assert!(pool.is_empty());
    }
}
