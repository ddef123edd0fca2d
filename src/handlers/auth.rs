//! Authentication handlers
//!
//! Implements login, logout, token refresh and current user endpoints

use axum::{extract::State, Extension, Json};

use crate::error::{AppError, AppResult};
use crate::jwt::TokenInfo;
use crate::middleware::CurrentUser;
use crate::routes::ApiResponse;
use crate::services::{LoginForm, LoginUser};
use crate::state::AppState;

/// POST /api/v1/login
pub async fn login(
    State(state): State<AppState>,
    Json(form): Json<LoginForm>,
) -> AppResult<Json<ApiResponse<TokenInfo>>> {
    if form.username.is_empty() || form.password.is_empty() {
        return Err(AppError::BadRequest("Username and password are required".to_string()));
    }
    let token = state.login.login(&form).await?;
    Ok(Json(ApiResponse::success(token)))
}

/// POST /api/v1/current/logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.login.logout(&user.token, &user.id).await?;
    Ok(Json(ApiResponse::success_msg("Logged out")))
}

/// POST /api/v1/current/refresh-token
pub async fn refresh_token(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<TokenInfo>>> {
    let token = state.login.refresh_token(&user.id).await?;
    Ok(Json(ApiResponse::success(token)))
}

/// GET /api/v1/current/user
pub async fn current_user(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<ApiResponse<LoginUser>>> {
    let info = state.login.current_user(&user.id).await?;
    Ok(Json(ApiResponse::success(info)))
}
