//! Menu handlers

use axum::{
    extract::{Path, Query, State},
    response::Json,
    Extension,
};

use crate::entity::menu::{self, MenuDetail, MenuTree};
use crate::entity::Status;
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::routes::ApiResponse;
use crate::services::{MenuForm, MenuQuery};
use crate::state::AppState;

/// GET /api/v1/menus
pub async fn list_menus(
    State(state): State<AppState>,
    Query(query): Query<MenuQuery>,
) -> AppResult<Json<ApiResponse<Vec<menu::Model>>>> {
    let menus = state.menus.query(&query).await?;
    Ok(Json(ApiResponse::success(menus)))
}

/// GET /api/v1/menus/tree
pub async fn menu_tree(
    State(state): State<AppState>,
    Query(query): Query<MenuQuery>,
) -> AppResult<Json<ApiResponse<Vec<MenuTree>>>> {
    let tree = state.menus.tree(&query).await?;
    Ok(Json(ApiResponse::success(tree)))
}

/// GET /api/v1/menus/:id
pub async fn get_menu(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<MenuDetail>>> {
    let menu = state.menus.get(&id).await?;
    Ok(Json(ApiResponse::success(menu)))
}

/// POST /api/v1/menus
pub async fn create_menu(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(form): Json<MenuForm>,
) -> AppResult<Json<ApiResponse<MenuDetail>>> {
    let menu = state.menus.create(form, &user.id).await?;
    Ok(Json(ApiResponse::success(menu)))
}

/// PUT /api/v1/menus/:id
pub async fn update_menu(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(form): Json<MenuForm>,
) -> AppResult<Json<ApiResponse<MenuDetail>>> {
    let menu = state.menus.update(&id, form, &user.id).await?;
    Ok(Json(ApiResponse::success(menu)))
}

/// DELETE /api/v1/menus/:id
pub async fn delete_menu(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.menus.delete(&id).await?;
    Ok(Json(ApiResponse::success_msg("Menu deleted")))
}

/// PATCH /api/v1/menus/:id/enable
pub async fn enable_menu(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.menus.update_status(&id, Status::Enabled, &user.id).await?;
    Ok(Json(ApiResponse::success_msg("Menu enabled")))
}

/// PATCH /api/v1/menus/:id/disable
pub async fn disable_menu(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<()>>> {
    state.menus.update_status(&id, Status::Disabled, &user.id).await?;
    Ok(Json(ApiResponse::success_msg("Menu disabled")))
}
