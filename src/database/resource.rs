use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use super::DbError;

/// 查询条件中的字段值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Bool(bool),
    Uuid(Uuid),
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<Uuid> for FieldValue {
    fn from(id: Uuid) -> Self {
        FieldValue::Uuid(id)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Int(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// 可查询的列，限定为资源声明过的列名
pub trait Column: Copy + Send + Sync + 'static {
    /// 主键列
    const ID: Self;

    fn name(&self) -> &'static str;
}

/// 持久化存储中的资源(如用户)
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// 资源族名称，同时是缓存键的命名空间
    const FAMILY: &'static str;

    type Column: Column;
    /// 创建时提交的数据
    type Draft: Send + Sync + 'static;
    /// 更新时提交的数据
    type Patch: Send + Sync + 'static;

    fn id(&self) -> Uuid;

    fn deleted_at(&self) -> Option<DateTime<Utc>>;

    fn field(&self, column: Self::Column) -> FieldValue;

    fn from_draft(id: Uuid, draft: Self::Draft, now: DateTime<Utc>) -> Self;

    fn apply(&mut self, patch: &Self::Patch, now: DateTime<Utc>);

    /// 软删除就是一次设置删除时间的更新
    fn deletion_patch(at: DateTime<Utc>) -> Self::Patch;
}

/// 列表和计数查询的过滤条件，软删除的记录总是被排除
#[derive(Debug, Clone)]
pub struct Filter<C> {
    pub conditions: Vec<(C, FieldValue)>,
    pub exclude_id: Option<Uuid>,
}

impl<C> Default for Filter<C> {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            exclude_id: None,
        }
    }
}

impl<C: Column> Filter<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: C, value: impl Into<FieldValue>) -> Self {
        self.conditions.push((column, value.into()));
        self
    }

    pub fn excluding(mut self, id: Option<Uuid>) -> Self {
        self.exclude_id = id;
        self
    }

    /// 记录是否满足条件(含软删除排除)
    pub fn matches<E: Resource<Column = C>>(&self, record: &E) -> bool {
        record.deleted_at().is_none()
            && self.exclude_id != Some(record.id())
            && self
                .conditions
                .iter()
                .all(|(column, value)| record.field(*column) == *value)
    }
}

/// 持久化存储的边界
///
/// 所有读操作都排除软删除的记录，删除只通过 `update_by_id` 写入删除时间实现。
#[async_trait]
pub trait PersistentStore<E: Resource>: Send + Sync {
    async fn create(&self, draft: E::Draft) -> Result<E, DbError>;

    async fn find_one_by(
        &self,
        column: E::Column,
        value: &FieldValue,
    ) -> Result<Option<E>, DbError>;

    /// 更新未删除的记录，返回受影响行数
    async fn update_by_id(&self, id: Uuid, patch: &E::Patch) -> Result<u64, DbError>;

    async fn count_by(&self, filter: &Filter<E::Column>) -> Result<u64, DbError>;

    async fn list_by(
        &self,
        filter: &Filter<E::Column>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<E>, DbError>;
}
