// 用户实体
// 定义用户相关的数据库实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::database::resource::{Column, FieldValue, Resource};

/// 用户实体，对应数据库中的 users 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct User {
    /// 用户ID
    pub id: Uuid,
    /// 邮箱，未删除用户之间唯一
    pub email: String,
    /// 昵称
    pub nickname: String,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
    /// 删除时间，非空表示已软删除
    pub deleted_at: Option<DateTime<Utc>>,
}

/// 用户表中允许作为查询条件的列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserColumn {
    Id,
    Email,
    Nickname,
}

impl Column for UserColumn {
    const ID: Self = UserColumn::Id;

    fn name(&self) -> &'static str {
        match self {
            UserColumn::Id => "id",
            UserColumn::Email => "email",
            UserColumn::Nickname => "nickname",
        }
    }
}

/// 创建用户的数据
#[derive(Debug, Clone, Deserialize)]
pub struct UserDraft {
    pub email: String,
    pub nickname: String,
}

/// 更新用户的数据，`None` 表示不修改
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub email: Option<String>,
    pub nickname: Option<String>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Resource for User {
    const FAMILY: &'static str = "user";

    type Column = UserColumn;
    type Draft = UserDraft;
    type Patch = UserPatch;

    fn id(&self) -> Uuid {
        self.id
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    fn field(&self, column: UserColumn) -> FieldValue {
        match column {
            UserColumn::Id => FieldValue::Uuid(self.id),
            UserColumn::Email => FieldValue::Text(self.email.clone()),
            UserColumn::Nickname => FieldValue::Text(self.nickname.clone()),
        }
    }

    fn from_draft(id: Uuid, draft: UserDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            email: draft.email,
            nickname: draft.nickname,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    fn apply(&mut self, patch: &UserPatch, now: DateTime<Utc>) {
        if let Some(email) = &patch.email {
            self.email = email.clone();
        }
        if let Some(nickname) = &patch.nickname {
            self.nickname = nickname.clone();
        }
        if let Some(at) = patch.deleted_at {
            self.deleted_at = Some(at);
        }
        self.updated_at = now;
    }

    fn deletion_patch(at: DateTime<Utc>) -> UserPatch {
        UserPatch {
            deleted_at: Some(at),
            ..Default::default()
        }
    }
}
