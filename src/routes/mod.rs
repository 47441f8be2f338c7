use std::sync::Arc;

use axum::{Router, routing::get};
#[cfg(debug_assertions)]
use tower_http::cors::CorsLayer;

use crate::{
    AppState,
    cache::AdmissionController,
    middleware::{log_errors, rate_limit},
};

pub mod user;

/// 用户相关的路由
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(user::list_users).post(user::create_user))
        .route(
            "/users/{id}",
            get(user::get_user)
                .put(user::update_user)
                .delete(user::delete_user),
        )
}

/// 创建完整的应用路由：准入控制在最外层，先于任何业务逻辑执行
pub fn create_router(state: AppState, admission: Arc<AdmissionController>) -> Router {
    let base = state.config.api_base_uri.trim_end_matches('/').to_string();
    let router = if base.is_empty() {
        Router::new().merge(user_routes())
    } else {
        Router::new().nest(&base, user_routes())
    };

    let router = router
        .layer(axum::middleware::from_fn(log_errors))
        .layer(axum::middleware::from_fn_with_state(admission, rate_limit));

    // 开发模式下允许所有来源
    #[cfg(debug_assertions)]
    let router = router.layer(CorsLayer::permissive());

    router.with_state(state)
}
