use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::DbError;
use super::entities::user::{User, UserColumn, UserDraft, UserPatch};
use super::resource::{Column, FieldValue, Filter, PersistentStore};

const USER_COLUMNS: &str = "id, email, nickname, created_at, updated_at, deleted_at";

/// 用户表的 Postgres 存储
///
/// 期望的表结构：
///
/// ```sql
/// CREATE TABLE users (
///     id          UUID PRIMARY KEY,
///     email       TEXT NOT NULL,
///     nickname    TEXT NOT NULL,
///     created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
///     updated_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
///     deleted_at  TIMESTAMPTZ
/// );
/// CREATE UNIQUE INDEX users_email_live ON users (email) WHERE deleted_at IS NULL;
/// ```
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// LIMIT/OFFSET 绑定为 BIGINT，超出范围时取上限
fn sql_bigint(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn push_value(qb: &mut QueryBuilder<'_, Postgres>, value: &FieldValue) {
    match value {
        FieldValue::Text(s) => qb.push_bind(s.clone()),
        FieldValue::Int(n) => qb.push_bind(*n),
        FieldValue::Bool(b) => qb.push_bind(*b),
        FieldValue::Uuid(id) => qb.push_bind(*id),
    };
}

/// 拼接 WHERE 子句，总是排除软删除的记录
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &Filter<UserColumn>) {
    qb.push(" WHERE deleted_at IS NULL");
    for (column, value) in &filter.conditions {
        qb.push(" AND ").push(column.name()).push(" = ");
        push_value(qb, value);
    }
    if let Some(id) = filter.exclude_id {
        qb.push(" AND id <> ").push_bind(id);
    }
}

#[async_trait]
impl PersistentStore<User> for PgUserStore {
    async fn create(&self, draft: UserDraft) -> Result<User, DbError> {
        let now = Utc::now();
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, email, nickname, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&draft.email)
        .bind(&draft.nickname)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .inspect_err(|e| tracing::error!(error = %e, "failed to insert user"))?;

        Ok(user)
    }

    async fn find_one_by(
        &self,
        column: UserColumn,
        value: &FieldValue,
    ) -> Result<Option<User>, DbError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {USER_COLUMNS} FROM users"));
        push_filter(&mut qb, &Filter::new().eq(column, value.clone()));
        qb.push(" LIMIT 1");

        let user = qb
            .build_query_as::<User>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn update_by_id(&self, id: Uuid, patch: &UserPatch) -> Result<u64, DbError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE users SET updated_at = ");
        qb.push_bind(Utc::now());
        if let Some(email) = &patch.email {
            qb.push(", email = ").push_bind(email.clone());
        }
        if let Some(nickname) = &patch.nickname {
            qb.push(", nickname = ").push_bind(nickname.clone());
        }
        if let Some(at) = patch.deleted_at {
            qb.push(", deleted_at = ").push_bind(at);
        }
        qb.push(" WHERE id = ")
            .push_bind(id)
            .push(" AND deleted_at IS NULL");

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn count_by(&self, filter: &Filter<UserColumn>) -> Result<u64, DbError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        push_filter(&mut qb, filter);

        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    async fn list_by(
        &self,
        filter: &Filter<UserColumn>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<User>, DbError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {USER_COLUMNS} FROM users"));
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at ASC, id ASC LIMIT ")
            .push_bind(sql_bigint(limit))
            .push(" OFFSET ")
            .push_bind(sql_bigint(offset));

        let users = qb.build_query_as::<User>().fetch_all(&self.pool).await?;
        Ok(users)
    }
}
