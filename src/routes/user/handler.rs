use axum::{
    Json,
    extract::{Path, Query, State},
};
use uuid::Uuid;

use crate::{
    AppState,
    database::{Filter, User, UserColumn},
    error::AppError,
    pagination::Page,
    result::ApiResponse,
    utils::success_to_api_response,
};

use super::model::{CreateUserRequest, DeleteUserResponse, ListUsersQuery, UpdateUserRequest};

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

#[axum::debug_handler]
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<User> {
    let draft = req.into_draft()?;

    if state.users.exists(UserColumn::Email, draft.email.as_str(), None).await? {
        return Err(AppError::Validation("邮箱已被使用".to_string()));
    }

    let user = state.users.create(draft).await?;
    tracing::info!(user_id = %user.id, "user created");
    Ok(success_to_api_response(user))
}

#[axum::debug_handler]
pub async fn get_user(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<User> {
    let user = state.users.find_one_by(UserColumn::Id, id).await?;
    Ok(success_to_api_response(user))
}

#[axum::debug_handler]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<User> {
    let patch = req.into_patch()?;

    if let Some(email) = &patch.email {
        if state
            .users
            .exists(UserColumn::Email, email.as_str(), Some(id))
            .await?
        {
            return Err(AppError::Validation("邮箱已被使用".to_string()));
        }
    }

    let user = state.users.update(id, patch).await?;
    Ok(success_to_api_response(user))
}

#[axum::debug_handler]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<DeleteUserResponse> {
    state.users.soft_delete(id).await?;
    tracing::info!(user_id = %id, "user deleted");
    Ok(success_to_api_response(DeleteUserResponse { id }))
}

#[axum::debug_handler]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> ApiResult<Page<User>> {
    let mut filter = Filter::new();
    if let Some(nickname) = query.nickname.filter(|n| !n.trim().is_empty()) {
        filter = filter.eq(UserColumn::Nickname, nickname.trim());
    }

    let page = state
        .users
        .list_paginated(query.page.as_deref(), query.limit.as_deref(), filter)
        .await?;
    Ok(success_to_api_response(page))
}
