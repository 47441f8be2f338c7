use std::time::Duration;

use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::database::DbError;
use crate::utils::{error_codes, error_to_api_response, retry_after_secs};

/// 对外的错误分类
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 点数耗尽或处于封禁期
    #[error("admission rejected, retry after {retry_after:?}")]
    AdmissionRejected { retry_after: Duration },
    /// 共享存储或持久化存储不可用
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found")]
    NotFound,
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<DbError> for AppError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound => AppError::NotFound,
            DbError::Validation(msg) => AppError::Validation(msg),
            DbError::Unavailable(msg) => AppError::StoreUnavailable(msg),
            DbError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error_message) = match &self {
            AppError::AdmissionRejected { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                error_codes::RATE_LIMIT,
                format!("请求过于频繁，请在{}秒后重试", retry_after_secs(*retry_after)),
            ),
            AppError::StoreUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                error_codes::SERVICE_UNAVAILABLE,
                "服务暂时不可用".to_string(),
            ),
            AppError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                error_codes::VALIDATION_ERROR,
                msg.clone(),
            ),
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                error_codes::NOT_FOUND,
                "资源不存在".to_string(),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_codes::INTERNAL_ERROR,
                "内部服务器错误".to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let mut response = (status, error_to_api_response::<()>(code, error_message)).into_response();
        if let AppError::AdmissionRejected { retry_after } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs(retry_after).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
