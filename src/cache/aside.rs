//! 旁路缓存的数据访问层
//!
//! 读：先查共享缓存，未命中时查持久化存储并回填。
//! 写：先写持久化存储，再删除整个资源族的缓存，不直接写入新值。
//! 缓存只是性能优化，共享存储出错或超时时所有操作都直接走持久化存储。

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use super::keys;
use super::store::{SharedStore, bounded};
use crate::database::{Column, DbError, FieldValue, Filter, PersistentStore, Resource};
use crate::pagination::{Page, Pagination, PaginationConfig};

const FIND_ONE_BY: &str = "findOneBy";

/// 缓存配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// 缓存条目的存活时间
    pub ttl: Duration,
    /// 单次共享存储调用的超时
    pub timeout: Duration,
    pub pagination: PaginationConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            timeout: Duration::from_millis(250),
            pagination: PaginationConfig::default(),
        }
    }
}

/// 某个资源族的旁路缓存存储
pub struct CacheAsideStore<E: Resource> {
    db: Arc<dyn PersistentStore<E>>,
    cache: Arc<dyn SharedStore>,
    config: CacheConfig,
    _resource: PhantomData<fn() -> E>,
}

impl<E: Resource> Clone for CacheAsideStore<E> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            cache: Arc::clone(&self.cache),
            config: self.config,
            _resource: PhantomData,
        }
    }
}

impl<E: Resource> CacheAsideStore<E> {
    pub fn new(
        db: Arc<dyn PersistentStore<E>>,
        cache: Arc<dyn SharedStore>,
        config: CacheConfig,
    ) -> Self {
        Self {
            db,
            cache,
            config,
            _resource: PhantomData,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// 创建记录，成功后失效整个资源族
    pub async fn create(&self, draft: E::Draft) -> Result<E, DbError> {
        let record = self.db.create(draft).await?;
        self.invalidate().await;
        tracing::debug!(family = E::FAMILY, id = %record.id(), "record created");
        Ok(record)
    }

    /// 按列查找一条未删除的记录
    pub async fn find_one_by(
        &self,
        column: E::Column,
        value: impl Into<FieldValue>,
    ) -> Result<E, DbError> {
        let value = value.into();
        let key = keys::cache_key(
            E::FAMILY,
            FIND_ONE_BY,
            &[FieldValue::Text(column.name().to_string()), value.clone()],
        );

        if let Some(record) = self.read_cached(&key).await {
            return Ok(record);
        }

        let record = self
            .db
            .find_one_by(column, &value)
            .await?
            .ok_or(DbError::NotFound)?;
        self.populate(&key, &record).await;
        Ok(record)
    }

    /// 更新记录并返回持久化存储中的最新版本
    pub async fn update(&self, id: Uuid, patch: E::Patch) -> Result<E, DbError> {
        let affected = self.db.update_by_id(id, &patch).await?;
        if affected == 0 {
            return Err(DbError::NotFound);
        }

        // 先失效再重读，重读失败时缓存也已经失效
        self.invalidate().await;
        let record = self
            .db
            .find_one_by(<E::Column as Column>::ID, &FieldValue::Uuid(id))
            .await?
            .ok_or(DbError::NotFound)?;
        tracing::debug!(family = E::FAMILY, id = %id, "record updated");
        Ok(record)
    }

    /// 软删除：写入删除时间
    pub async fn soft_delete(&self, id: Uuid) -> Result<(), DbError> {
        let affected = self
            .db
            .update_by_id(id, &E::deletion_patch(Utc::now()))
            .await?;
        if affected == 0 {
            return Err(DbError::NotFound);
        }
        self.invalidate().await;
        tracing::debug!(family = E::FAMILY, id = %id, "record soft-deleted");
        Ok(())
    }

    /// 是否存在满足条件的未删除记录，可排除一个记录ID
    ///
    /// 用于唯一性检查，不走缓存。
    pub async fn exists(
        &self,
        column: E::Column,
        value: impl Into<FieldValue>,
        exclude_id: Option<Uuid>,
    ) -> Result<bool, DbError> {
        let filter = Filter::new().eq(column, value).excluding(exclude_id);
        Ok(self.db.count_by(&filter).await? > 0)
    }

    /// 分页列表，不走缓存
    pub async fn list_paginated(
        &self,
        page: Option<&str>,
        limit: Option<&str>,
        filter: Filter<E::Column>,
    ) -> Result<Page<E>, DbError> {
        let pagination = Pagination::from_raw(page, limit, &self.config.pagination);
        let total = self.db.count_by(&filter).await?;
        let data = self
            .db
            .list_by(&filter, pagination.offset(), pagination.limit)
            .await?;

        Ok(Page {
            data,
            pagination: pagination.info(total),
        })
    }

    async fn read_cached(&self, key: &str) -> Option<E> {
        let raw = match bounded(self.config.timeout, self.cache.get(key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(key = %key, "cache miss");
                return None;
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache read failed, falling through");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(record) => {
                tracing::debug!(key = %key, "cache hit");
                Some(record)
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "dropping undecodable cache entry");
                if let Err(e) = bounded(self.config.timeout, self.cache.delete(key)).await {
                    tracing::warn!(key = %key, error = %e, "failed to drop cache entry");
                }
                None
            }
        }
    }

    async fn populate(&self, key: &str, record: &E) {
        let json = match serde_json::to_string(record) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to encode record for cache");
                return;
            }
        };
        if let Err(e) = bounded(self.config.timeout, self.cache.set(key, &json, self.config.ttl)).await
        {
            tracing::warn!(key = %key, error = %e, "cache populate failed");
        }
    }

    /// 删除资源族下的所有缓存条目，失败只记录日志，不影响写操作的结果
    async fn invalidate(&self) {
        let prefix = keys::family_prefix(E::FAMILY);
        match bounded(self.config.timeout, self.cache.delete_prefix(&prefix)).await {
            Ok(deleted) => {
                tracing::debug!(family = E::FAMILY, deleted, "cache family invalidated")
            }
            Err(e) => {
                tracing::warn!(family = E::FAMILY, error = %e, "cache invalidation failed")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::database::{MemoryTable, User, UserColumn, UserDraft, UserPatch};

    fn setup() -> (
        CacheAsideStore<User>,
        Arc<MemoryTable<User>>,
        Arc<MemoryStore>,
    ) {
        let db = Arc::new(MemoryTable::<User>::new().with_unique(UserColumn::Email));
        let cache = Arc::new(MemoryStore::new());
        let store = CacheAsideStore::new(db.clone(), cache.clone(), CacheConfig::default());
        (store, db, cache)
    }

    fn draft(email: &str) -> UserDraft {
        UserDraft {
            email: email.to_string(),
            nickname: "nick".to_string(),
        }
    }

    #[tokio::test]
    async fn create_does_not_populate_cache() {
        let (store, _, cache) = setup();
        store.create(draft("a@x.io")).await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn second_read_is_served_from_cache() {
        let (store, db, cache) = setup();
        let user = store.create(draft("a@x.io")).await.unwrap();
        let before = db.calls();

        let first = store.find_one_by(UserColumn::Id, user.id).await.unwrap();
        let second = store.find_one_by(UserColumn::Id, user.id).await.unwrap();

        assert_eq!(db.calls(), before + 1);
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn update_invalidates_and_returns_fresh_record() {
        let (store, _, cache) = setup();
        let user = store.create(draft("a@x.io")).await.unwrap();
        store.find_one_by(UserColumn::Email, "a@x.io").await.unwrap();
        assert_eq!(cache.len(), 1);

        let patch = UserPatch {
            nickname: Some("renamed".into()),
            ..Default::default()
        };
        let updated = store.update(user.id, patch).await.unwrap();
        assert_eq!(updated.nickname, "renamed");
        assert!(cache.is_empty());

        let read = store.find_one_by(UserColumn::Email, "a@x.io").await.unwrap();
        assert_eq!(read.nickname, "renamed");
    }

    #[tokio::test]
    async fn soft_delete_hides_record_and_invalidates() {
        let (store, _, cache) = setup();
        let user = store.create(draft("a@x.io")).await.unwrap();
        store.find_one_by(UserColumn::Id, user.id).await.unwrap();

        store.soft_delete(user.id).await.unwrap();
        assert!(cache.is_empty());
        assert!(matches!(
            store.find_one_by(UserColumn::Id, user.id).await,
            Err(DbError::NotFound)
        ));
        assert!(matches!(
            store.soft_delete(user.id).await,
            Err(DbError::NotFound)
        ));
    }

    #[tokio::test]
    async fn missing_records_are_not_cached() {
        let (store, _, cache) = setup();
        let err = store
            .find_one_by(UserColumn::Email, "nobody@x.io")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn update_of_unknown_id_is_not_found() {
        let (store, _, _) = setup();
        let err = store
            .update(Uuid::new_v4(), UserPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound));
    }

    #[tokio::test]
    async fn exists_is_uncached_and_honours_exclusion() {
        let (store, db, cache) = setup();
        let user = store.create(draft("a@x.io")).await.unwrap();
        let before = db.calls();

        assert!(store.exists(UserColumn::Email, "a@x.io", None).await.unwrap());
        assert!(!store
            .exists(UserColumn::Email, "a@x.io", Some(user.id))
            .await
            .unwrap());
        assert!(!store.exists(UserColumn::Email, "b@x.io", None).await.unwrap());

        assert_eq!(db.calls(), before + 3);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn validation_failures_propagate_unchanged() {
        let (store, _, _) = setup();
        store.create(draft("a@x.io")).await.unwrap();
        let err = store.create(draft("a@x.io")).await.unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }

    #[tokio::test]
    async fn corrupt_cache_entries_are_treated_as_misses() {
        let (store, db, cache) = setup();
        let user = store.create(draft("a@x.io")).await.unwrap();
        let key = keys::cache_key(
            User::FAMILY,
            FIND_ONE_BY,
            &[FieldValue::Text("id".into()), FieldValue::Uuid(user.id)],
        );
        cache
            .set(&key, "{not json", Duration::from_secs(60))
            .await
            .unwrap();

        let before = db.calls();
        let found = store.find_one_by(UserColumn::Id, user.id).await.unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(db.calls(), before + 1);

        // 回填后的条目可以正常读取
        store.find_one_by(UserColumn::Id, user.id).await.unwrap();
        assert_eq!(db.calls(), before + 1);
    }

    #[tokio::test]
    async fn list_paginated_clamps_and_counts() {
        let (store, _, _) = setup();
        for i in 0..7 {
            store.create(draft(&format!("{i}@x.io"))).await.unwrap();
        }

        let page = store
            .list_paginated(Some("2"), Some("3"), Filter::new())
            .await
            .unwrap();
        assert_eq!(page.data.len(), 3);
        assert_eq!(page.data[0].email, "3@x.io");
        assert_eq!(page.pagination.total, 7);
        assert_eq!(page.pagination.total_pages, 3);

        let page = store
            .list_paginated(Some("-1"), Some("1000"), Filter::new())
            .await
            .unwrap();
        assert_eq!(page.pagination.page, 1);
        assert_eq!(page.pagination.limit, 100);
        assert_eq!(page.data.len(), 7);
    }
}
