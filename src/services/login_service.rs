//! Login, logout and the per-user role memo

use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::{ns, Cacher, UserCache};
use crate::config::RootConfig;
use crate::entity::{user, UserStatus};
use crate::error::{AppError, AppResult};
use crate::jwt::{JwtAuth, TokenInfo};
use crate::services::user_service::role_ids_of;

/// Login request
#[derive(Debug, Clone, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// The authenticated user, root included
#[derive(Debug, Clone, Serialize)]
pub struct LoginUser {
    pub id: String,
    pub username: String,
    pub name: String,
    pub is_root: bool,
    pub role_ids: Vec<String>,
}

#[derive(Clone)]
pub struct LoginService {
    db: DatabaseConnection,
    cache: Arc<dyn Cacher>,
    auth: Arc<JwtAuth>,
    root: RootConfig,
    role_ttl: Duration,
}

impl LoginService {
    pub fn new(
        db: DatabaseConnection,
        cache: Arc<dyn Cacher>,
        auth: Arc<JwtAuth>,
        root: RootConfig,
        role_ttl: Duration,
    ) -> Self {
        Self {
            db,
            cache,
            auth,
            root,
            role_ttl,
        }
    }

    pub fn is_root(&self, user_id: &str) -> bool {
        user_id == self.root.id
    }

    /// Verify credentials and issue a token. The root account is checked
    /// first; an empty root password disables it.
    pub async fn login(&self, form: &LoginForm) -> AppResult<TokenInfo> {
        let username = form.username.trim();

        if username == self.root.username && !self.root.password.is_empty() {
            if form.password != self.root.password {
                warn!("Failed root login attempt");
                return Err(bad_credentials());
            }
            info!("Root user logged in");
            return self.auth.generate_token(&self.root.id);
        }

        let user = user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(&self.db)
            .await?
            .ok_or_else(bad_credentials)?;

        let password_valid = bcrypt::verify(&form.password, &user.password).unwrap_or(false);
        if !password_valid {
            warn!("Failed login attempt for user: {}", username);
            return Err(bad_credentials());
        }
        if user.status != UserStatus::Activated {
            return Err(AppError::BadRequest("User is frozen".to_string()));
        }

        let role_ids = role_ids_of(&self.db, &user.id).await?;
        self.remember_roles(&user.id, role_ids).await?;

        info!("User logged in: {} ({})", user.username, user.id);
        self.auth.generate_token(&user.id)
    }

    /// Revoke the presented token and forget the user's role memo
    pub async fn logout(&self, token: &str, user_id: &str) -> AppResult<()> {
        self.auth.destroy_token(token).await?;
        self.cache.delete(ns::USER_ROLE, user_id).await?;
        info!("User logged out: {}", user_id);
        Ok(())
    }

    pub async fn refresh_token(&self, user_id: &str) -> AppResult<TokenInfo> {
        self.auth.generate_token(user_id)
    }

    pub async fn current_user(&self, user_id: &str) -> AppResult<LoginUser> {
        if self.is_root(user_id) {
            return Ok(LoginUser {
                id: self.root.id.clone(),
                username: self.root.username.clone(),
                name: self.root.name.clone(),
                is_root: true,
                role_ids: Vec::new(),
            });
        }

        let role_ids = self.user_roles(user_id).await?;
        let user = user::Entity::find_by_id(user_id.to_string())
            .one(&self.db)
            .await?
            .ok_or(AppError::InvalidToken)?;

        Ok(LoginUser {
            id: user.id,
            username: user.username,
            name: user.name,
            is_root: false,
            role_ids,
        })
    }

    /// Role ids of an authenticated user. Served from the memo when present;
    /// otherwise the user must still exist and be active.
    pub async fn user_roles(&self, user_id: &str) -> AppResult<Vec<String>> {
        if self.is_root(user_id) {
            return Ok(Vec::new());
        }

        if let Some(cached) = self.cache.get(ns::USER_ROLE, user_id).await? {
            match serde_json::from_str::<UserCache>(&cached) {
                Ok(entry) => return Ok(entry.role_ids),
                Err(e) => debug!("Discarding unreadable role cache for {}: {}", user_id, e),
            }
        }

        let user = user::Entity::find_by_id(user_id.to_string())
            .one(&self.db)
            .await?
            .ok_or(AppError::InvalidToken)?;
        if user.status != UserStatus::Activated {
            return Err(AppError::InvalidToken);
        }

        let role_ids = role_ids_of(&self.db, user_id).await?;
        self.remember_roles(user_id, role_ids.clone()).await?;
        Ok(role_ids)
    }

    async fn remember_roles(&self, user_id: &str, role_ids: Vec<String>) -> AppResult<()> {
        let value = serde_json::to_string(&UserCache { role_ids })?;
        self.cache
            .set(ns::USER_ROLE, user_id, &value, Some(self.role_ttl))
            .await
    }
}

fn bad_credentials() -> AppError {
    AppError::BadRequest("Incorrect username or password".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::JwtConfig;
    use crate::entity::Status;
    use crate::services::role_service::{RoleForm, RoleService};
    use crate::services::user_service::{UserForm, UserService};
    use crate::services::testing::setup;

    struct Fixture {
        login: LoginService,
        users: UserService,
        roles: RoleService,
        auth: Arc<JwtAuth>,
        cache: Arc<MemoryCache>,
    }

    fn root() -> RootConfig {
        RootConfig {
            id: "root".to_string(),
            username: "admin".to_string(),
            password: "rootpass".to_string(),
            name: "Admin".to_string(),
        }
    }

    async fn fixture() -> Fixture {
        let (db, cache) = setup().await;
        let auth = Arc::new(JwtAuth::new(&JwtConfig::default(), cache.clone()).unwrap());
        Fixture {
            login: LoginService::new(
                db.clone(),
                cache.clone(),
                auth.clone(),
                root(),
                Duration::from_secs(60),
            ),
            users: UserService::new(db.clone(), cache.clone(), root()),
            roles: RoleService::new(db, cache.clone()),
            auth,
            cache,
        }
    }

    async fn alice(fx: &Fixture) -> (String, String) {
        let role_id = fx
            .roles
            .create(
                RoleForm {
                    name: "ops".to_string(),
                    sequence: 0,
                    status: Status::Enabled,
                    remark: String::new(),
                    menus: Vec::new(),
                },
                "t",
            )
            .await
            .unwrap()
            .role
            .id;
        let user_id = fx
            .users
            .create(
                UserForm {
                    username: "alice".to_string(),
                    name: "Alice".to_string(),
                    password: Some("pw".to_string()),
                    email: None,
                    remark: String::new(),
                    status: UserStatus::Activated,
                    role_ids: vec![role_id.clone()],
                },
                "t",
            )
            .await
            .unwrap()
            .id;
        (user_id, role_id)
    }

    fn login_form(username: &str, password: &str) -> LoginForm {
        LoginForm {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_root_login() {
        let fx = fixture().await;
        let token = fx.login.login(&login_form("admin", "rootpass")).await.unwrap();
        assert_eq!(fx.auth.parse_subject(&token.access_token).await.unwrap(), "root");

        let err = fx.login.login(&login_form("admin", "nope")).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let me = fx.login.current_user("root").await.unwrap();
        assert!(me.is_root);
        assert!(fx.login.user_roles("root").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_user_login_memoises_roles() {
        let fx = fixture().await;
        let (user_id, role_id) = alice(&fx).await;

        let token = fx.login.login(&login_form("alice", "pw")).await.unwrap();
        assert_eq!(fx.auth.parse_subject(&token.access_token).await.unwrap(), user_id);

        let cached = fx.cache.get(ns::USER_ROLE, &user_id).await.unwrap().unwrap();
        let entry: UserCache = serde_json::from_str(&cached).unwrap();
        assert_eq!(entry.role_ids, vec![role_id.clone()]);

        let me = fx.login.current_user(&user_id).await.unwrap();
        assert_eq!(me.username, "alice");
        assert_eq!(me.role_ids, vec![role_id]);

        assert!(matches!(
            fx.login.login(&login_form("alice", "wrong")).await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            fx.login.login(&login_form("nobody", "pw")).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_role_memo_follows_role_deletion() {
        let fx = fixture().await;
        let (user_id, role_id) = alice(&fx).await;
        fx.login.login(&login_form("alice", "pw")).await.unwrap();

        fx.roles.delete(&role_id).await.unwrap();
        assert!(!fx.cache.exists(ns::USER_ROLE, &user_id).await.unwrap());

        // Miss recomputes from the database and re-populates
        assert!(fx.login.user_roles(&user_id).await.unwrap().is_empty());
        assert!(fx.cache.exists(ns::USER_ROLE, &user_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_frozen_user() {
        let fx = fixture().await;
        let (user_id, _) = alice(&fx).await;
        fx.users.update_status(&user_id, UserStatus::Freezed, "t").await.unwrap();

        assert!(matches!(
            fx.login.login(&login_form("alice", "pw")).await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(fx.login.user_roles(&user_id).await, Err(AppError::InvalidToken)));
        assert!(matches!(fx.login.user_roles("ghost").await, Err(AppError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_logout_revokes_token() {
        let fx = fixture().await;
        let (user_id, _) = alice(&fx).await;
        let token = fx.login.login(&login_form("alice", "pw")).await.unwrap().access_token;

        fx.login.logout(&token, &user_id).await.unwrap();
        assert!(matches!(fx.auth.parse_subject(&token).await, Err(AppError::InvalidToken)));
        assert!(!fx.cache.exists(ns::USER_ROLE, &user_id).await.unwrap());

        let fresh = fx.login.refresh_token(&user_id).await.unwrap().access_token;
        assert_eq!(fx.auth.parse_subject(&fresh).await.unwrap(), user_id);
    }
}
