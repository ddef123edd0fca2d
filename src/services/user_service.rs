//! User service
//!
//! The root user lives only in config; every operation addressed to its id is
//! refused here.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::cache::Cacher;
use crate::config::RootConfig;
use crate::entity::user::{self, UserResponse};
use crate::entity::{new_id, role, user_role, UserStatus};
use crate::error::{AppError, AppResult, OptionExt};
use crate::services::{dedup_ids, invalidate_user_roles, require};

#[cfg(not(test))]
const HASH_COST: u32 = 12;
#[cfg(test)]
const HASH_COST: u32 = 4;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserQuery {
    pub username: Option<String>,
    pub status: Option<UserStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserForm {
    pub username: String,
    #[serde(default)]
    pub name: String,
    /// Required on create; left unchanged on update when absent or empty
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub remark: String,
    #[serde(default)]
    pub status: UserStatus,
    #[serde(default)]
    pub role_ids: Vec<String>,
}

impl UserForm {
    fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }
}

#[derive(Clone)]
pub struct UserService {
    db: DatabaseConnection,
    cache: Arc<dyn Cacher>,
    root: RootConfig,
}

impl UserService {
    pub fn new(db: DatabaseConnection, cache: Arc<dyn Cacher>, root: RootConfig) -> Self {
        Self { db, cache, root }
    }

    fn ensure_not_root(&self, id: &str) -> AppResult<()> {
        if id == self.root.id {
            return Err(AppError::Forbidden);
        }
        Ok(())
    }

    pub async fn query(&self, params: &UserQuery) -> AppResult<Vec<UserResponse>> {
        let mut query = user::Entity::find();
        if let Some(username) = params.username.as_deref().filter(|n| !n.is_empty()) {
            query = query.filter(user::Column::Username.contains(username));
        }
        if let Some(status) = params.status {
            query = query.filter(user::Column::Status.eq(status));
        }
        let users = query
            .order_by_desc(user::Column::CreatedAt)
            .all(&self.db)
            .await?;

        let ids: Vec<&str> = users.iter().map(|u| u.id.as_str()).collect();
        let mut roles_by_user: HashMap<String, Vec<String>> = HashMap::new();
        if !ids.is_empty() {
            for row in user_role::Entity::find()
                .filter(user_role::Column::UserId.is_in(ids))
                .all(&self.db)
                .await?
            {
                roles_by_user.entry(row.user_id).or_default().push(row.role_id);
            }
        }

        Ok(users
            .into_iter()
            .map(|u| {
                let role_ids = roles_by_user.remove(&u.id).unwrap_or_default();
                UserResponse::from(u).with_role_ids(role_ids)
            })
            .collect())
    }

    pub async fn get(&self, id: &str) -> AppResult<UserResponse> {
        self.ensure_not_root(id)?;
        let user = user::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .ok_or_not_found("User not found")?;
        let role_ids = role_ids_of(&self.db, id).await?;
        Ok(UserResponse::from(user).with_role_ids(role_ids))
    }

    pub async fn create(&self, form: UserForm, by: &str) -> AppResult<UserResponse> {
        require(&form.username, "Username")?;
        let password = form
            .password()
            .ok_or_else(|| AppError::BadRequest("Password must not be empty".to_string()))?;
        let hashed = hash_password(password)?;
        let role_ids = dedup_ids(&form.role_ids);

        let id = new_id();
        let now = Utc::now();
        let txn = self.db.begin().await?;

        self.ensure_unique_username(&txn, &form.username, None).await?;
        ensure_roles_exist(&txn, &role_ids).await?;

        user::ActiveModel {
            id: Set(id.clone()),
            username: Set(form.username.clone()),
            name: Set(form.name.clone()),
            password: Set(hashed),
            email: Set(form.email.clone()),
            remark: Set(form.remark.clone()),
            status: Set(form.status),
            created_at: Set(now),
            updated_at: Set(now),
            created_by: Set(by.to_string()),
            updated_by: Set(by.to_string()),
        }
        .insert(&txn)
        .await?;
        insert_user_roles(&txn, &id, &role_ids).await?;

        txn.commit().await?;

        info!("User created: {} ({})", form.username, id);
        self.get(&id).await
    }

    /// Update fields and replace role assignments
    pub async fn update(&self, id: &str, form: UserForm, by: &str) -> AppResult<UserResponse> {
        self.ensure_not_root(id)?;
        require(&form.username, "Username")?;
        let hashed = form.password().map(hash_password).transpose()?;
        let role_ids = dedup_ids(&form.role_ids);

        let txn = self.db.begin().await?;
        let old = user::Entity::find_by_id(id.to_string())
            .one(&txn)
            .await?
            .ok_or_not_found("User not found")?;

        self.ensure_unique_username(&txn, &form.username, Some(id)).await?;
        ensure_roles_exist(&txn, &role_ids).await?;

        let mut am: user::ActiveModel = old.into();
        am.username = Set(form.username.clone());
        am.name = Set(form.name.clone());
        am.email = Set(form.email.clone());
        am.remark = Set(form.remark.clone());
        am.status = Set(form.status);
        if let Some(hashed) = hashed {
            am.password = Set(hashed);
        }
        am.updated_at = Set(Utc::now());
        am.updated_by = Set(by.to_string());
        am.update(&txn).await?;

        user_role::Entity::delete_many()
            .filter(user_role::Column::UserId.eq(id))
            .exec(&txn)
            .await?;
        insert_user_roles(&txn, id, &role_ids).await?;

        txn.commit().await?;
        invalidate_user_roles(self.cache.as_ref(), [id]).await?;

        info!("User updated: {} ({})", form.username, id);
        self.get(id).await
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        self.ensure_not_root(id)?;

        let txn = self.db.begin().await?;
        let user = user::Entity::find_by_id(id.to_string())
            .one(&txn)
            .await?
            .ok_or_not_found("User not found")?;

        user_role::Entity::delete_many()
            .filter(user_role::Column::UserId.eq(id))
            .exec(&txn)
            .await?;
        user::Entity::delete_by_id(id.to_string()).exec(&txn).await?;

        txn.commit().await?;
        invalidate_user_roles(self.cache.as_ref(), [id]).await?;

        info!("User deleted: {} ({})", user.username, id);
        Ok(())
    }

    pub async fn update_status(&self, id: &str, status: UserStatus, by: &str) -> AppResult<()> {
        self.ensure_not_root(id)?;

        let user = user::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .ok_or_not_found("User not found")?;

        let mut am: user::ActiveModel = user.into();
        am.status = Set(status);
        am.updated_at = Set(Utc::now());
        am.updated_by = Set(by.to_string());
        am.update(&self.db).await?;

        invalidate_user_roles(self.cache.as_ref(), [id]).await?;

        info!("User {} set to {:?}", id, status);
        Ok(())
    }

    async fn ensure_unique_username<C: ConnectionTrait>(
        &self,
        db: &C,
        username: &str,
        exclude: Option<&str>,
    ) -> AppResult<()> {
        if username == self.root.username {
            return Err(AppError::BadRequest(format!("Username already exists: {}", username)));
        }
        let mut query = user::Entity::find().filter(user::Column::Username.eq(username));
        if let Some(id) = exclude {
            query = query.filter(user::Column::Id.ne(id));
        }
        if query.one(db).await?.is_some() {
            return Err(AppError::BadRequest(format!("Username already exists: {}", username)));
        }
        Ok(())
    }
}

pub(crate) fn hash_password(password: &str) -> AppResult<String> {
    bcrypt::hash(password, HASH_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Role ids assigned to a user
pub(crate) async fn role_ids_of<C: ConnectionTrait>(db: &C, user_id: &str) -> AppResult<Vec<String>> {
    Ok(user_role::Entity::find()
        .select_only()
        .column(user_role::Column::RoleId)
        .filter(user_role::Column::UserId.eq(user_id))
        .into_tuple::<String>()
        .all(db)
        .await?)
}

async fn ensure_roles_exist<C: ConnectionTrait>(db: &C, role_ids: &[String]) -> AppResult<()> {
    if role_ids.is_empty() {
        return Ok(());
    }
    let found = role::Entity::find()
        .filter(role::Column::Id.is_in(role_ids.iter().map(String::as_str)))
        .count(db)
        .await?;
    if found as usize != role_ids.len() {
        return Err(AppError::BadRequest("Unknown role id".to_string()));
    }
    Ok(())
}

async fn insert_user_roles<C: ConnectionTrait>(db: &C, user_id: &str, role_ids: &[String]) -> AppResult<()> {
    for role_id in role_ids {
        user_role::ActiveModel {
            id: Set(new_id()),
            user_id: Set(user_id.to_string()),
            role_id: Set(role_id.clone()),
        }
        .insert(db)
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ns, MemoryCache};
    use crate::entity::Status;
    use crate::services::role_service::{RoleForm, RoleService};
    use crate::services::testing::setup;

    fn root() -> RootConfig {
        RootConfig {
            id: "root".to_string(),
            username: "admin".to_string(),
            password: "secret".to_string(),
            name: "Admin".to_string(),
        }
    }

    fn user_form(username: &str, role_ids: Vec<String>) -> UserForm {
        UserForm {
            username: username.to_string(),
            name: username.to_string(),
            password: Some("pass123".to_string()),
            email: None,
            remark: String::new(),
            status: UserStatus::Activated,
            role_ids,
        }
    }

    async fn services() -> (UserService, RoleService, Arc<MemoryCache>) {
        let (db, cache) = setup().await;
        (
            UserService::new(db.clone(), cache.clone(), root()),
            RoleService::new(db, cache.clone()),
            cache,
        )
    }

    async fn role(roles: &RoleService, name: &str) -> String {
        roles
            .create(
                RoleForm {
                    name: name.to_string(),
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
            .id
    }

    #[tokio::test]
    async fn test_create_hashes_password_and_assigns_roles() {
        let (svc, roles, _) = services().await;
        let r = role(&roles, "ops").await;

        let created = svc.create(user_form("alice", vec![r.clone(), r.clone()]), "t").await.unwrap();
        assert_eq!(created.role_ids, vec![r]);

        let stored = user::Entity::find_by_id(created.id.clone()).one(&svc.db).await.unwrap().unwrap();
        assert_ne!(stored.password, "pass123");
        assert!(bcrypt::verify("pass123", &stored.password).unwrap());

        let json = serde_json::to_value(&created).unwrap();
        assert!(json.get("password").is_none());
    }

    #[tokio::test]
    async fn test_create_rejections() {
        let (svc, _, _) = services().await;
        svc.create(user_form("alice", vec![]), "t").await.unwrap();

        let dup = svc.create(user_form("alice", vec![]), "t").await;
        assert!(matches!(dup, Err(AppError::BadRequest(_))));
        let shadow = svc.create(user_form("admin", vec![]), "t").await;
        assert!(matches!(shadow, Err(AppError::BadRequest(_))));
        let unknown = svc.create(user_form("bob", vec!["ghost".to_string()]), "t").await;
        assert!(matches!(unknown, Err(AppError::BadRequest(_))));

        let mut no_pass = user_form("carol", vec![]);
        no_pass.password = None;
        assert!(matches!(svc.create(no_pass, "t").await, Err(AppError::BadRequest(_))));

        assert_eq!(svc.query(&UserQuery::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_root_is_forbidden() {
        let (svc, _, _) = services().await;
        assert!(matches!(svc.get("root").await, Err(AppError::Forbidden)));
        assert!(matches!(svc.delete("root").await, Err(AppError::Forbidden)));
        assert!(matches!(
            svc.update("root", user_form("x", vec![]), "t").await,
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            svc.update_status("root", UserStatus::Freezed, "t").await,
            Err(AppError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_update_replaces_roles_and_invalidates() {
        let (svc, roles, cache) = services().await;
        let a = role(&roles, "a").await;
        let b = role(&roles, "b").await;
        let user = svc.create(user_form("alice", vec![a]), "t").await.unwrap();
        let old_hash = user::Entity::find_by_id(user.id.clone()).one(&svc.db).await.unwrap().unwrap().password;
        cache.set(ns::USER_ROLE, &user.id, "{}", None).await.unwrap();

        let mut form = user_form("alice", vec![b.clone()]);
        form.password = None;
        let updated = svc.update(&user.id, form, "t").await.unwrap();

        assert_eq!(updated.role_ids, vec![b]);
        assert!(!cache.exists(ns::USER_ROLE, &user.id).await.unwrap());
        let new_hash = user::Entity::find_by_id(user.id.clone()).one(&svc.db).await.unwrap().unwrap().password;
        assert_eq!(old_hash, new_hash);
    }

    #[tokio::test]
    async fn test_status_and_delete_invalidate() {
        let (svc, roles, cache) = services().await;
        let a = role(&roles, "a").await;
        let user = svc.create(user_form("alice", vec![a]), "t").await.unwrap();

        cache.set(ns::USER_ROLE, &user.id, "{}", None).await.unwrap();
        svc.update_status(&user.id, UserStatus::Freezed, "t").await.unwrap();
        assert!(!cache.exists(ns::USER_ROLE, &user.id).await.unwrap());
        assert_eq!(svc.get(&user.id).await.unwrap().status, UserStatus::Freezed);

        cache.set(ns::USER_ROLE, &user.id, "{}", None).await.unwrap();
        svc.delete(&user.id).await.unwrap();
        assert!(!cache.exists(ns::USER_ROLE, &user.id).await.unwrap());
        assert!(matches!(svc.get(&user.id).await, Err(AppError::NotFound(_))));
        assert!(user_role::Entity::find().all(&svc.db).await.unwrap().is_empty());
    }
}
