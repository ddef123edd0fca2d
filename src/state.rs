use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::cache::{Cacher, MemoryCache};
use crate::casbinx::Casbinx;
use crate::config::Config;
use crate::error::AppResult;
use crate::jwt::JwtAuth;
use crate::services::{LoginService, MenuService, RoleService, UserService};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Shared cache: role memo, policy signals, token denylist
    pub cache: Arc<dyn Cacher>,
    pub auth: Arc<JwtAuth>,
    /// Policy synchronizer
    pub casbinx: Casbinx,
    pub menus: MenuService,
    pub roles: RoleService,
    pub users: UserService,
    pub login: LoginService,
}

impl AppState {
    /// Assemble every service over an open database. Performs the first
    /// policy load, so this fails if the policy cannot be built.
    pub async fn new(config: Config, db: DatabaseConnection) -> AppResult<Self> {
        let cache: Arc<dyn Cacher> = Arc::new(MemoryCache::new());
        let auth = Arc::new(JwtAuth::new(&config.jwt, cache.clone())?);
        let casbinx = Casbinx::new(db.clone(), cache.clone(), &config.casbin).await?;

        let menus = MenuService::new(db.clone(), cache.clone());
        let roles = RoleService::new(db.clone(), cache.clone());
        let users = UserService::new(db.clone(), cache.clone(), config.root.clone());
        let login = LoginService::new(
            db,
            cache.clone(),
            auth.clone(),
            config.root.clone(),
            config.cache.user_role_ttl(),
        );

        Ok(Self {
            config: Arc::new(config),
            cache,
            auth,
            casbinx,
            menus,
            roles,
            users,
            login,
        })
    }
}
