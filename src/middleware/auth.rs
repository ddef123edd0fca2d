//! Authentication and authorization middleware
//!
//! `auth_layer` turns a bearer token into a [`CurrentUser`]; `casbin_layer`
//! runs inside it and checks `(role, path, method)` against the published
//! policy.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Extension to store current user in request
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub id: String,
    pub is_root: bool,
    pub role_ids: Vec<String>,
    /// Raw bearer token, needed to revoke it on logout
    pub token: String,
}

/// Paths that don't require authentication
fn is_public_path(path: &str) -> bool {
    // Only API routes are guarded
    if !path.starts_with("/api") {
        return true;
    }
    path == "/api/health" || path == "/api/v1/login"
}

/// Authentication middleware
pub async fn auth_layer(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> AppResult<Response> {
    if is_public_path(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let token = request
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
        .ok_or(AppError::InvalidToken)?;

    let user_id = state.auth.parse_subject(&token).await?;
    let role_ids = state.login.user_roles(&user_id).await?;

    let current_user = CurrentUser {
        is_root: state.login.is_root(&user_id),
        id: user_id,
        role_ids,
        token,
    };
    request.extensions_mut().insert(current_user);

    Ok(next.run(request).await)
}

/// Authorization middleware; must run inside `auth_layer`
pub async fn casbin_layer(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> AppResult<Response> {
    let config = &state.config.casbin;
    let path = request.uri().path().to_string();

    if config.disable
        || is_public_path(&path)
        || config.skip_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    {
        return Ok(next.run(request).await);
    }

    let user = request
        .extensions()
        .get::<CurrentUser>()
        .cloned()
        .ok_or(AppError::InvalidToken)?;
    if user.is_root {
        return Ok(next.run(request).await);
    }

    let method = request.method().as_str().to_string();
    for role_id in &user.role_ids {
        if state.casbinx.enforce(role_id, &path, &method).await? {
            return Ok(next.run(request).await);
        }
    }

    tracing::debug!("Permission denied: {} {} for user {}", method, path, user.id);
    Err(AppError::Forbidden)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_paths() {
        assert!(is_public_path("/api/health"));
        assert!(is_public_path("/api/v1/login"));
        assert!(is_public_path("/index.html"));
        assert!(!is_public_path("/api/v1/menus"));
        assert!(!is_public_path("/api/v1/current/user"));
    }
}
