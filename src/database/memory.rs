use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::DbError;
use super::resource::{Column, FieldValue, Filter, PersistentStore, Resource};

/// 进程内的持久化存储
///
/// 没有配置数据库时的单实例模式和测试使用。按插入顺序保存记录，
/// 支持声明唯一列，并统计被调用的次数。
pub struct MemoryTable<E: Resource> {
    rows: RwLock<Vec<E>>,
    unique: Vec<E::Column>,
    calls: AtomicUsize,
}

impl<E: Resource> Default for MemoryTable<E> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            unique: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl<E: Resource> MemoryTable<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 声明一个在未删除记录之间唯一的列
    pub fn with_unique(mut self, column: E::Column) -> Self {
        self.unique.push(column);
        self
    }

    /// 到目前为止的存储调用次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn check_unique(&self, rows: &[E], candidate: &E) -> Result<(), DbError> {
        for column in &self.unique {
            let value = candidate.field(*column);
            let clash = rows.iter().any(|row| {
                row.id() != candidate.id()
                    && row.deleted_at().is_none()
                    && row.field(*column) == value
            });
            if clash {
                return Err(DbError::Validation(format!(
                    "duplicate value for unique column {}",
                    column.name()
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<E: Resource> PersistentStore<E> for MemoryTable<E> {
    async fn create(&self, draft: E::Draft) -> Result<E, DbError> {
        self.hit();
        let record = E::from_draft(Uuid::new_v4(), draft, Utc::now());
        let mut rows = self.rows.write().await;
        self.check_unique(&rows, &record)?;
        rows.push(record.clone());
        Ok(record)
    }

    async fn find_one_by(
        &self,
        column: E::Column,
        value: &FieldValue,
    ) -> Result<Option<E>, DbError> {
        self.hit();
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .find(|row| row.deleted_at().is_none() && row.field(column) == *value)
            .cloned())
    }

    async fn update_by_id(&self, id: Uuid, patch: &E::Patch) -> Result<u64, DbError> {
        self.hit();
        let mut rows = self.rows.write().await;
        let Some(index) = rows
            .iter()
            .position(|row| row.id() == id && row.deleted_at().is_none())
        else {
            return Ok(0);
        };

        let mut updated = rows[index].clone();
        updated.apply(patch, Utc::now());
        self.check_unique(&rows, &updated)?;
        rows[index] = updated;
        Ok(1)
    }

    async fn count_by(&self, filter: &Filter<E::Column>) -> Result<u64, DbError> {
        self.hit();
        let rows = self.rows.read().await;
        Ok(rows.iter().filter(|row| filter.matches(*row)).count() as u64)
    }

    async fn list_by(
        &self,
        filter: &Filter<E::Column>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<E>, DbError> {
        self.hit();
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|row| filter.matches(*row))
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}
