// 数据库模块
// 包含资源定义、持久化存储边界及其实现

pub mod entities;
pub mod memory;
pub mod postgres;
pub mod resource;

pub use entities::user::{User, UserColumn, UserDraft, UserPatch};
pub use memory::MemoryTable;
pub use postgres::PgUserStore;
pub use resource::{Column, FieldValue, Filter, PersistentStore, Resource};

/// 持久化存储错误
#[derive(Debug, Clone, thiserror::Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    /// 唯一约束等校验失败，原样返回给调用方，不自动重试
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("persistent store unavailable: {0}")]
    Unavailable(String),
    #[error("persistent store error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for DbError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::Database(db)
                if db.is_unique_violation()
                    || db.is_check_violation()
                    || db.is_foreign_key_violation() =>
            {
                DbError::Validation(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => DbError::Unavailable(e.to_string()),
            _ => DbError::Internal(e.to_string()),
        }
    }
}
