use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers;
use crate::middleware::{auth_layer, casbin_layer};
use crate::state::AppState;

pub mod health;

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: true,
            message: "success".to_string(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn success_msg(message: impl Into<String>) -> Self {
        Self {
            code: true,
            message: message.into(),
            data: None,
        }
    }
}

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let v1_routes = Router::new()
        // Auth routes
        .route("/login", post(handlers::auth::login))
        .route("/current/logout", post(handlers::auth::logout))
        .route("/current/refresh-token", post(handlers::auth::refresh_token))
        .route("/current/user", get(handlers::auth::current_user))
        // Menu routes
        .route(
            "/menus",
            get(handlers::menu::list_menus).post(handlers::menu::create_menu),
        )
        .route("/menus/tree", get(handlers::menu::menu_tree))
        .route(
            "/menus/:id",
            get(handlers::menu::get_menu)
                .put(handlers::menu::update_menu)
                .delete(handlers::menu::delete_menu),
        )
        .route("/menus/:id/enable", patch(handlers::menu::enable_menu))
        .route("/menus/:id/disable", patch(handlers::menu::disable_menu))
        // Role routes
        .route(
            "/roles",
            get(handlers::role::list_roles).post(handlers::role::create_role),
        )
        .route(
            "/roles/:id",
            get(handlers::role::get_role)
                .put(handlers::role::update_role)
                .delete(handlers::role::delete_role),
        )
        .route("/roles/:id/enable", patch(handlers::role::enable_role))
        .route("/roles/:id/disable", patch(handlers::role::disable_role))
        // User routes
        .route(
            "/users",
            get(handlers::user::list_users).post(handlers::user::create_user),
        )
        .route(
            "/users/:id",
            get(handlers::user::get_user)
                .put(handlers::user::update_user)
                .delete(handlers::user::delete_user),
        )
        .route("/users/:id/enable", patch(handlers::user::enable_user))
        .route("/users/:id/disable", patch(handlers::user::disable_user));

    let api_routes = Router::new()
        .route("/health", get(health::health_check))
        .nest("/v1", v1_routes);

    // Layers run outermost-last: cors, trace, auth, then casbin
    Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(state.clone(), casbin_layer))
        .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::{Config, DatabaseConfig};
    use crate::db::init_database;
    use crate::entity::new_id;

    async fn app() -> Router {
        let dir = std::env::temp_dir().join(format!("rbac-admin-routes-{}", new_id()));
        let mut config = Config::default();
        config.database = DatabaseConfig::sqlite_memory();
        config.casbin.model_file = dir.join("model.conf");
        config.casbin.policy_file = dir.join("policy.csv");
        config.root.password = "rootpass".to_string();

        let db = init_database(&config.database).await.unwrap();
        create_router(AppState::new(config, db).await.unwrap())
    }

    async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = app().await;
        let (status, body) = send(&app, Method::GET, "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "healthy");
    }

    #[tokio::test]
    async fn test_missing_or_bad_token() {
        let app = app().await;
        let (status, body) = send(&app, Method::GET, "/api/v1/menus", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["id"], "invalid_token");

        let (status, _) = send(&app, Method::GET, "/api/v1/menus", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_root_session_lifecycle() {
        let app = app().await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/login",
            None,
            Some(json!({"username": "admin", "password": "rootpass"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["data"]["access_token"].as_str().unwrap().to_string();

        let (status, body) = send(&app, Method::GET, "/api/v1/current/user", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["is_root"], true);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/menus",
            Some(&token),
            Some(json!({"name": "system"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let menu_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(&app, Method::GET, "/api/v1/menus/tree", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["id"], menu_id.as_str());

        let (status, body) = send(&app, Method::GET, "/api/v1/users/root", Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["id"], "forbidden");

        let (status, _) = send(&app, Method::POST, "/api/v1/current/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, Method::GET, "/api/v1/current/user", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_bad_login() {
        let app = app().await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/login",
            None,
            Some(json!({"username": "admin", "password": "wrong"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["id"], "bad_request");
    }
}
