use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::{UserDraft, UserPatch};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub nickname: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub nickname: Option<String>,
}

/// 列表查询参数，保留原始字符串，由分页逻辑负责校正
#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub nickname: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteUserResponse {
    pub id: Uuid,
}

fn check_email(email: &str) -> Result<String, AppError> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation("邮箱格式无效".to_string()));
    }
    Ok(email.to_ascii_lowercase())
}

fn check_nickname(nickname: &str) -> Result<String, AppError> {
    let nickname = nickname.trim();
    if nickname.is_empty() || nickname.chars().count() > 32 {
        return Err(AppError::Validation("昵称长度必须在1到32个字符之间".to_string()));
    }
    Ok(nickname.to_string())
}

impl CreateUserRequest {
    pub fn into_draft(self) -> Result<UserDraft, AppError> {
        Ok(UserDraft {
            email: check_email(&self.email)?,
            nickname: check_nickname(&self.nickname)?,
        })
    }
}

impl UpdateUserRequest {
    pub fn into_patch(self) -> Result<UserPatch, AppError> {
        Ok(UserPatch {
            email: self.email.as_deref().map(check_email).transpose()?,
            nickname: self.nickname.as_deref().map(check_nickname).transpose()?,
            deleted_at: None,
        })
    }
}
