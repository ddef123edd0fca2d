//! User handlers

use axum::{
    extract::{Path, Query, State},
    response::Json,
    Extension,
};

use crate::entity::user::UserResponse;
use crate::entity::UserStatus;
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::routes::ApiResponse;
use crate::services::{UserForm, UserQuery};
use crate::state::AppState;

/// GET /api/v1/users
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<ApiResponse<Vec<UserResponse>>>> {
    let users = state.users.query(&query).await?;
    Ok(Json(ApiResponse::success(users)))
}

/// GET /api/v1/users/:id
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<UserResponse>>> {
    let user = state.users.get(&id).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// POST /api/v1/users
pub async fn create_user(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(form): Json<UserForm>,
) -> AppResult<Json<ApiResponse<UserResponse>>> {
    let created = state.users.create(form, &user.id).await?;
    Ok(Json(ApiResponse::success(created)))
}

/// PUT /api/v1/users/:id
pub async fn update_user(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(form): Json<UserForm>,
) -> AppResult<Json<ApiResponse<UserResponse>>> {
    let updated = state.users.update(&id, form, &user.id).await?;
    Ok(Json(ApiResponse::success(updated)))
}

/// DELETE /api/v1/users/:id
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.users.delete(&id).await?;
    Ok(Json(ApiResponse::success_msg("User deleted")))
}

/// PATCH /api/v1/users/:id/enable
pub async fn enable_user(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.users.update_status(&id, UserStatus::Activated, &user.id).await?;
    Ok(Json(ApiResponse::success_msg("User enabled")))
}

/// PATCH /api/v1/users/:id/disable
pub async fn disable_user(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.users.update_status(&id, UserStatus::Freezed, &user.id).await?;
    Ok(Json(ApiResponse::success_msg("User disabled")))
}
