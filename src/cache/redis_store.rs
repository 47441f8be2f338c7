use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client as RedisClient, Script};

use super::store::{BoundedIncr, SharedStore, StoreError};

/// 有上限的自增：计数达到上限时不再增加，整个过程在 Redis 内原子执行
const INCR_BOUNDED_LUA: &str = r#"
local limit = tonumber(ARGV[1])
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
local incremented = 0
if current < limit then
    current = redis.call('INCR', KEYS[1])
    incremented = 1
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
    ttl = tonumber(ARGV[2])
end
return {current, incremented, ttl}
"#;

/// SCAN 每批返回的键数量提示
const SCAN_BATCH: usize = 200;

/// Redis 实现的共享存储
///
/// 持有一个自动重连的多路复用连接，克隆后共用同一条连接。
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    incr_script: Script,
}

impl RedisStore {
    /// 建立连接，连接失败时返回 `StoreError::Unavailable`
    pub async fn connect(client: RedisClient) -> Result<Self, StoreError> {
        let conn = client.get_connection_manager().await?;
        Ok(Self::new(conn))
    }

    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            incr_script: Script::new(INCR_BOUNDED_LUA),
        }
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

fn millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

/// PTTL 返回 -2 表示键不存在，-1 表示没有过期时间
fn pttl_to_duration(pttl: i64) -> Option<Duration> {
    match pttl {
        -2 => None,
        ms if ms < 0 => Some(Duration::MAX),
        ms => Some(Duration::from_millis(ms as u64)),
    }
}

/// 转义 glob 特殊字符，保证前缀按字面匹配
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('*');
    escaped
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn incr_bounded(
        &self,
        key: &str,
        limit: u64,
        ttl: Duration,
    ) -> Result<BoundedIncr, StoreError> {
        let mut conn = self.conn();
        let (count, incremented, pttl): (i64, i64, i64) = self
            .incr_script
            .key(key)
            .arg(limit)
            .arg(millis(ttl))
            .invoke_async(&mut conn)
            .await?;

        Ok(BoundedIncr {
            count: count.max(0) as u64,
            incremented: incremented == 1,
            ttl: Duration::from_millis(pttl.max(0) as u64),
        })
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.conn();
        let pttl: i64 = conn.pttl(key).await?;
        Ok(pttl_to_duration(pttl))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let _: () = conn.pset_ex(key, value, millis(ttl)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn();
        let pattern = escape_glob(prefix);
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let removed: u64 = conn.del(&keys).await?;
                deleted += removed;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        tracing::debug!(prefix = %prefix, deleted, "redis prefix invalidated");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_pattern_escapes_special_characters() {
        assert_eq!(escape_glob("cache:user:"), "cache:user:*");
        assert_eq!(escape_glob("a*b?[c]\\"), "a\\*b\\?\\[c\\]\\\\*");
    }

    #[test]
    fn pttl_sentinels() {
        assert_eq!(pttl_to_duration(-2), None);
        assert_eq!(pttl_to_duration(-1), Some(Duration::MAX));
        assert_eq!(pttl_to_duration(1500), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn zero_ttl_rounds_up_to_one_millisecond() {
        assert_eq!(millis(Duration::ZERO), 1);
        assert_eq!(millis(Duration::from_secs(2)), 2000);
    }
}
