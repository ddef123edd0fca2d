//! Role handlers

use axum::{
    extract::{Path, Query, State},
    response::Json,
    Extension,
};

use crate::entity::role::{self, RoleDetail};
use crate::entity::Status;
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::routes::ApiResponse;
use crate::services::{RoleForm, RoleQuery};
use crate::state::AppState;

/// GET /api/v1/roles
pub async fn list_roles(
    State(state): State<AppState>,
    Query(query): Query<RoleQuery>,
) -> AppResult<Json<ApiResponse<Vec<role::Model>>>> {
    let roles = state.roles.query(&query).await?;
    Ok(Json(ApiResponse::success(roles)))
}

/// GET /api/v1/roles/:id
pub async fn get_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<RoleDetail>>> {
    let role = state.roles.get(&id).await?;
    Ok(Json(ApiResponse::success(role)))
}

/// POST /api/v1/roles
pub async fn create_role(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(form): Json<RoleForm>,
) -> AppResult<Json<ApiResponse<RoleDetail>>> {
    let role = state.roles.create(form, &user.id).await?;
    Ok(Json(ApiResponse::success(role)))
}

/// PUT /api/v1/roles/:id
pub async fn update_role(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(form): Json<RoleForm>,
) -> AppResult<Json<ApiResponse<RoleDetail>>> {
    let role = state.roles.update(&id, form, &user.id).await?;
    Ok(Json(ApiResponse::success(role)))
}

/// DELETE /api/v1/roles/:id
pub async fn delete_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.roles.delete(&id).await?;
    Ok(Json(ApiResponse::success_msg("Role deleted")))
}

/// PATCH /api/v1/roles/:id/enable
pub async fn enable_role(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.roles.update_status(&id, Status::Enabled, &user.id).await?;
    Ok(Json(ApiResponse::success_msg("Role enabled")))
}

/// PATCH /api/v1/roles/:id/disable
pub async fn disable_role(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.roles.update_status(&id, Status::Disabled, &user.id).await?;
    Ok(Json(ApiResponse::success_msg("Role disabled")))
}
