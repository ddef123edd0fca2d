//! Role service
//!
//! A role's menu grants are replaced wholesale on update. Every write bumps
//! `role.updated_at`, which is what the policy auto-loader watches; removals
//! (delete, disable) raise the role tombstone instead.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::cache::Cacher;
use crate::casbinx::notify_role_removed;
use crate::entity::role::{self, RoleDetail};
use crate::entity::{menu_action, new_id, role_menu, user_role, Status};
use crate::error::{AppError, AppResult, OptionExt};
use crate::services::{invalidate_user_roles, require};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleQuery {
    pub name: Option<String>,
    pub status: Option<Status>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleForm {
    pub name: String,
    #[serde(default)]
    pub sequence: i32,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub remark: String,
    #[serde(default)]
    pub menus: Vec<RoleMenuForm>,
}

/// One granted menu action
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct RoleMenuForm {
    pub menu_id: String,
    pub action_id: String,
}

#[derive(Clone)]
pub struct RoleService {
    db: DatabaseConnection,
    cache: Arc<dyn Cacher>,
}

impl RoleService {
    pub fn new(db: DatabaseConnection, cache: Arc<dyn Cacher>) -> Self {
        Self { db, cache }
    }

    pub async fn query(&self, params: &RoleQuery) -> AppResult<Vec<role::Model>> {
        let mut query = role::Entity::find();
        if let Some(name) = params.name.as_deref().filter(|n| !n.is_empty()) {
            query = query.filter(role::Column::Name.contains(name));
        }
        if let Some(status) = params.status {
            query = query.filter(role::Column::Status.eq(status));
        }
        Ok(query
            .order_by_desc(role::Column::Sequence)
            .order_by_desc(role::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    pub async fn get(&self, id: &str) -> AppResult<RoleDetail> {
        let role = role::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .ok_or_not_found("Role not found")?;
        let menus = role_menu::Entity::find()
            .filter(role_menu::Column::RoleId.eq(id))
            .order_by_asc(role_menu::Column::MenuId)
            .all(&self.db)
            .await?;
        Ok(RoleDetail { role, menus })
    }

    pub async fn create(&self, form: RoleForm, by: &str) -> AppResult<RoleDetail> {
        require(&form.name, "Role name")?;

        let id = new_id();
        let now = Utc::now();
        let txn = self.db.begin().await?;

        ensure_unique_name(&txn, &form.name, None).await?;
        validate_grants(&txn, &form.menus).await?;

        role::ActiveModel {
            id: Set(id.clone()),
            name: Set(form.name.clone()),
            sequence: Set(form.sequence),
            status: Set(form.status),
            remark: Set(form.remark.clone()),
            created_at: Set(now),
            updated_at: Set(now),
            created_by: Set(by.to_string()),
            updated_by: Set(by.to_string()),
        }
        .insert(&txn)
        .await?;
        insert_grants(&txn, &id, &form.menus).await?;

        txn.commit().await?;

        info!("Role created: {} ({})", form.name, id);
        self.get(&id).await
    }

    /// Update fields and replace all menu grants
    pub async fn update(&self, id: &str, form: RoleForm, by: &str) -> AppResult<RoleDetail> {
        require(&form.name, "Role name")?;

        let txn = self.db.begin().await?;
        let old = role::Entity::find_by_id(id.to_string())
            .one(&txn)
            .await?
            .ok_or_not_found("Role not found")?;

        ensure_unique_name(&txn, &form.name, Some(id)).await?;
        validate_grants(&txn, &form.menus).await?;
        let disabled = old.status == Status::Enabled && form.status == Status::Disabled;

        let mut am: role::ActiveModel = old.into();
        am.name = Set(form.name.clone());
        am.sequence = Set(form.sequence);
        am.status = Set(form.status);
        am.remark = Set(form.remark.clone());
        // Always bumped, so a grant-only change still moves the watermark
        am.updated_at = Set(Utc::now());
        am.updated_by = Set(by.to_string());
        am.update(&txn).await?;

        role_menu::Entity::delete_many()
            .filter(role_menu::Column::RoleId.eq(id))
            .exec(&txn)
            .await?;
        insert_grants(&txn, id, &form.menus).await?;

        let holders = holder_ids(&txn, id).await?;
        txn.commit().await?;

        invalidate_user_roles(self.cache.as_ref(), &holders).await?;
        if disabled {
            notify_role_removed(self.cache.as_ref()).await?;
        }

        info!("Role updated: {} ({})", form.name, id);
        self.get(id).await
    }

    /// Delete the role with its grants and user assignments
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let txn = self.db.begin().await?;
        let role = role::Entity::find_by_id(id.to_string())
            .one(&txn)
            .await?
            .ok_or_not_found("Role not found")?;
        let holders = holder_ids(&txn, id).await?;

        role_menu::Entity::delete_many()
            .filter(role_menu::Column::RoleId.eq(id))
            .exec(&txn)
            .await?;
        user_role::Entity::delete_many()
            .filter(user_role::Column::RoleId.eq(id))
            .exec(&txn)
            .await?;
        role::Entity::delete_by_id(id.to_string()).exec(&txn).await?;

        txn.commit().await?;

        invalidate_user_roles(self.cache.as_ref(), &holders).await?;
        notify_role_removed(self.cache.as_ref()).await?;

        info!("Role deleted: {} ({})", role.name, id);
        Ok(())
    }

    pub async fn update_status(&self, id: &str, status: Status, by: &str) -> AppResult<()> {
        let role = role::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .ok_or_not_found("Role not found")?;
        let holders = holder_ids(&self.db, id).await?;

        let mut am: role::ActiveModel = role.into();
        am.status = Set(status);
        am.updated_at = Set(Utc::now());
        am.updated_by = Set(by.to_string());
        am.update(&self.db).await?;

        invalidate_user_roles(self.cache.as_ref(), &holders).await?;
        if status == Status::Disabled {
            notify_role_removed(self.cache.as_ref()).await?;
        }

        info!("Role {} set to {:?}", id, status);
        Ok(())
    }
}

async fn ensure_unique_name<C: ConnectionTrait>(db: &C, name: &str, exclude: Option<&str>) -> AppResult<()> {
    let mut query = role::Entity::find().filter(role::Column::Name.eq(name));
    if let Some(id) = exclude {
        query = query.filter(role::Column::Id.ne(id));
    }
    if query.one(db).await?.is_some() {
        return Err(AppError::BadRequest(format!("Role name already exists: {}", name)));
    }
    Ok(())
}

/// Every grant must name an action that belongs to the given menu
async fn validate_grants<C: ConnectionTrait>(db: &C, grants: &[RoleMenuForm]) -> AppResult<()> {
    if grants.is_empty() {
        return Ok(());
    }
    let action_ids: Vec<&str> = grants.iter().map(|g| g.action_id.as_str()).collect();
    let owners: HashMap<String, String> = menu_action::Entity::find()
        .select_only()
        .column(menu_action::Column::Id)
        .column(menu_action::Column::MenuId)
        .filter(menu_action::Column::Id.is_in(action_ids))
        .into_tuple::<(String, String)>()
        .all(db)
        .await?
        .into_iter()
        .collect();

    for grant in grants {
        if owners.get(&grant.action_id) != Some(&grant.menu_id) {
            return Err(AppError::BadRequest(format!(
                "Action {} does not belong to menu {}",
                grant.action_id, grant.menu_id
            )));
        }
    }
    Ok(())
}

async fn insert_grants<C: ConnectionTrait>(db: &C, role_id: &str, grants: &[RoleMenuForm]) -> AppResult<()> {
    let mut seen = std::collections::HashSet::new();
    for grant in grants.iter().filter(|g| seen.insert(*g)) {
        role_menu::ActiveModel {
            id: Set(new_id()),
            role_id: Set(role_id.to_string()),
            menu_id: Set(grant.menu_id.clone()),
            action_id: Set(grant.action_id.clone()),
        }
        .insert(db)
        .await?;
    }
    Ok(())
}

/// Users currently holding the role
async fn holder_ids<C: ConnectionTrait>(db: &C, role_id: &str) -> AppResult<Vec<String>> {
    Ok(user_role::Entity::find()
        .select_only()
        .column(user_role::Column::UserId)
        .filter(user_role::Column::RoleId.eq(role_id))
        .into_tuple::<String>()
        .all(db)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ns, MemoryCache};
    use crate::services::menu_service::{MenuActionForm, MenuForm, MenuService};
    use crate::services::testing::setup;

    fn role_form(name: &str) -> RoleForm {
        RoleForm {
            name: name.to_string(),
            sequence: 1,
            status: Status::Enabled,
            remark: String::new(),
            menus: Vec::new(),
        }
    }

    async fn services() -> (RoleService, MenuService, Arc<MemoryCache>) {
        let (db, cache) = setup().await;
        (
            RoleService::new(db.clone(), cache.clone()),
            MenuService::new(db, cache.clone()),
            cache,
        )
    }

    /// Menu with a single "view" action; returns the grant for it
    async fn widget_grant(menus: &MenuService) -> RoleMenuForm {
        let detail = menus
            .create(
                MenuForm {
                    name: "widgets".to_string(),
                    sequence: 0,
                    icon: String::new(),
                    link: String::new(),
                    parent_id: None,
                    status: Status::Enabled,
                    hide: false,
                    actions: vec![MenuActionForm {
                        code: "view".to_string(),
                        name: "View".to_string(),
                        resources: Vec::new(),
                    }],
                },
                "t",
            )
            .await
            .unwrap();
        RoleMenuForm {
            menu_id: detail.menu.id,
            action_id: detail.actions[0].id.clone(),
        }
    }

    async fn assign(svc: &RoleService, user_id: &str, role_id: &str) {
        user_role::ActiveModel {
            id: Set(new_id()),
            user_id: Set(user_id.to_string()),
            role_id: Set(role_id.to_string()),
        }
        .insert(&svc.db)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_create_and_duplicate_name() {
        let (svc, menus, _) = services().await;
        let grant = widget_grant(&menus).await;

        let mut form = role_form("admin");
        form.menus = vec![grant.clone(), grant];
        let created = svc.create(form, "t").await.unwrap();
        assert_eq!(created.role.name, "admin");
        assert_eq!(created.menus.len(), 1);

        let err = svc.create(role_form("admin"), "t").await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_grant_must_match_menu() {
        let (svc, menus, _) = services().await;
        let grant = widget_grant(&menus).await;

        let mut form = role_form("admin");
        form.menus = vec![RoleMenuForm {
            menu_id: "other".to_string(),
            action_id: grant.action_id,
        }];
        assert!(matches!(svc.create(form, "t").await, Err(AppError::BadRequest(_))));
        assert!(svc.query(&RoleQuery::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_replaces_grants_and_bumps_watermark() {
        let (svc, menus, cache) = services().await;
        let grant = widget_grant(&menus).await;
        let created = svc.create(role_form("admin"), "t").await.unwrap();
        assign(&svc, "u1", &created.role.id).await;
        cache.set(ns::USER_ROLE, "u1", "{}", None).await.unwrap();

        let mut form = role_form("admin");
        form.menus = vec![grant];
        let updated = svc.update(&created.role.id, form, "t").await.unwrap();

        assert_eq!(updated.menus.len(), 1);
        assert!(updated.role.updated_at > created.role.updated_at);
        assert!(!cache.exists(ns::USER_ROLE, "u1").await.unwrap());
        assert!(!cache.exists(ns::ROLE, ns::KEY_ROLE_DELETED).await.unwrap());

        let updated = svc.update(&created.role.id, role_form("admin"), "t").await.unwrap();
        assert!(updated.menus.is_empty());
    }

    #[tokio::test]
    async fn test_rename_conflict() {
        let (svc, _, _) = services().await;
        svc.create(role_form("a"), "t").await.unwrap();
        let b = svc.create(role_form("b"), "t").await.unwrap();
        let err = svc.update(&b.role.id, role_form("a"), "t").await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        // Keeping its own name is fine
        svc.update(&b.role.id, role_form("b"), "t").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_cleans_joins_and_sets_tombstone() {
        let (svc, menus, cache) = services().await;
        let grant = widget_grant(&menus).await;
        let mut form = role_form("admin");
        form.menus = vec![grant];
        let created = svc.create(form, "t").await.unwrap();
        assign(&svc, "u1", &created.role.id).await;
        cache.set(ns::USER_ROLE, "u1", "{}", None).await.unwrap();

        svc.delete(&created.role.id).await.unwrap();

        assert!(matches!(svc.get(&created.role.id).await, Err(AppError::NotFound(_))));
        assert!(role_menu::Entity::find().all(&svc.db).await.unwrap().is_empty());
        assert!(user_role::Entity::find().all(&svc.db).await.unwrap().is_empty());
        assert!(!cache.exists(ns::USER_ROLE, "u1").await.unwrap());
        assert!(cache.exists(ns::ROLE, ns::KEY_ROLE_DELETED).await.unwrap());
    }

    #[tokio::test]
    async fn test_disable_sets_tombstone() {
        let (svc, _, cache) = services().await;
        let created = svc.create(role_form("admin"), "t").await.unwrap();

        svc.update_status(&created.role.id, Status::Enabled, "t").await.unwrap();
        assert!(!cache.exists(ns::ROLE, ns::KEY_ROLE_DELETED).await.unwrap());

        svc.update_status(&created.role.id, Status::Disabled, "t").await.unwrap();
        assert!(cache.exists(ns::ROLE, ns::KEY_ROLE_DELETED).await.unwrap());
        assert_eq!(svc.get(&created.role.id).await.unwrap().role.status, Status::Disabled);

        assert!(matches!(
            svc.update_status("missing", Status::Disabled, "t").await,
            Err(AppError::NotFound(_))
        ));
    }
}
