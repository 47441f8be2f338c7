use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use tokio::time::Instant;

use super::store::{BoundedIncr, SharedStore, StoreError};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn new(value: impl Into<String>, ttl: Duration, now: Instant) -> Self {
        Self {
            value: value.into(),
            expires_at: now + ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// 进程内共享存储
///
/// 只在单实例模式和测试中使用，多进程部署必须使用 [`RedisStore`](super::RedisStore)。
/// 过期时间基于 tokio 时钟，测试中可以用暂停的时钟推进。
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 未过期的键数量
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live(&self, key: &str, now: Instant) -> Option<Entry> {
        let entry = self.entries.get(key)?;
        if entry.is_expired(now) {
            drop(entry);
            self.entries.remove_if(key, |_, e| e.is_expired(now));
            return None;
        }
        Some(entry.clone())
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn incr_bounded(
        &self,
        key: &str,
        limit: u64,
        ttl: Duration,
    ) -> Result<BoundedIncr, StoreError> {
        let now = Instant::now();
        // entry 持有分片写锁，读取、比较、写入在同一临界区内完成
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new("0", ttl, now));
        if entry.is_expired(now) {
            *entry = Entry::new("0", ttl, now);
        }

        let current: u64 = entry
            .value
            .parse()
            .map_err(|_| StoreError::Codec(format!("value at {key} is not a counter")))?;
        let incremented = current < limit;
        let count = if incremented { current + 1 } else { current };
        entry.value = count.to_string();

        Ok(BoundedIncr {
            count,
            incremented,
            ttl: entry.expires_at.saturating_duration_since(now),
        })
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(Entry::new(value, ttl, now));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry::new(value, ttl, now));
                Ok(true)
            }
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = Instant::now();
        Ok(self
            .live(key, now)
            .map(|e| e.expires_at.saturating_duration_since(now)))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.live(key, Instant::now()).map(|e| e.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.entries
            .insert(key.to_string(), Entry::new(value, ttl, Instant::now()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        let mut deleted = 0;
        self.entries.retain(|k, _| {
            let hit = k.starts_with(prefix);
            if hit {
                deleted += 1;
            }
            !hit
        });
        Ok(deleted)
    }
}
