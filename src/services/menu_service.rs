//! Menu hierarchy service
//!
//! Menus form a tree stored as a materialized path: `parent_path` holds every
//! ancestor id followed by `.`, so a subtree is one prefix query. Re-parenting
//! rewrites the prefix of every descendant inside the same transaction.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

use crate::cache::Cacher;
use crate::casbinx::notify_menu_changed;
use crate::entity::menu::{self, MenuDetail, MenuTree};
use crate::entity::menu_action::{self, MenuActionDetail};
use crate::entity::{menu_action_resource, new_id, role_menu, Status};
use crate::error::{AppError, AppResult, OptionExt};
use crate::services::require;

/// Query parameters for listing menus
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MenuQuery {
    /// Substring match on name
    pub name: Option<String>,
    pub status: Option<Status>,
    /// Direct children of this menu; empty string selects roots
    pub parent_id: Option<String>,
}

impl MenuQuery {
    fn is_filtered(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.is_empty())
            || self.status.is_some()
            || self.parent_id.is_some()
    }
}

/// Create/update payload
#[derive(Debug, Clone, Deserialize)]
pub struct MenuForm {
    pub name: String,
    #[serde(default)]
    pub sequence: i32,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub link: String,
    /// Empty or absent means a root menu
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub hide: bool,
    #[serde(default)]
    pub actions: Vec<MenuActionForm>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MenuActionForm {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub resources: Vec<ResourceForm>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceForm {
    pub method: String,
    pub path: String,
}

impl MenuForm {
    fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref().filter(|p| !p.is_empty())
    }

    fn validate(&self) -> AppResult<()> {
        require(&self.name, "Menu name")?;
        let mut codes = HashSet::new();
        for action in &self.actions {
            require(&action.code, "Action code")?;
            if !codes.insert(action.code.as_str()) {
                return Err(AppError::BadRequest(format!(
                    "Duplicate action code: {}",
                    action.code
                )));
            }
            for res in &action.resources {
                if !menu_action_resource::is_valid_method(res.method.trim()) {
                    return Err(AppError::BadRequest(format!(
                        "Invalid resource method: {:?}",
                        res.method
                    )));
                }
                if !menu_action_resource::is_valid_path(res.path.trim()) {
                    return Err(AppError::BadRequest(format!(
                        "Invalid resource path: {:?}",
                        res.path
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct MenuService {
    db: DatabaseConnection,
    cache: Arc<dyn Cacher>,
}

impl MenuService {
    pub fn new(db: DatabaseConnection, cache: Arc<dyn Cacher>) -> Self {
        Self { db, cache }
    }

    /// Flat list ordered by sequence (descending)
    pub async fn query(&self, params: &MenuQuery) -> AppResult<Vec<menu::Model>> {
        let mut query = menu::Entity::find();
        if let Some(name) = params.name.as_deref().filter(|n| !n.is_empty()) {
            query = query.filter(menu::Column::Name.contains(name));
        }
        if let Some(status) = params.status {
            query = query.filter(menu::Column::Status.eq(status));
        }
        match params.parent_id.as_deref() {
            Some("") => query = query.filter(menu::Column::ParentId.is_null()),
            Some(parent_id) => query = query.filter(menu::Column::ParentId.eq(parent_id)),
            None => {}
        }

        Ok(query
            .order_by_desc(menu::Column::Sequence)
            .order_by_asc(menu::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    /// Query result as a tree; a filtered result is widened with its ancestors
    /// so every match can be rendered in place.
    pub async fn tree(&self, params: &MenuQuery) -> AppResult<Vec<MenuTree>> {
        let mut list = self.query(params).await?;

        if params.is_filtered() && !list.is_empty() {
            let ids = split_parent_ids(&list);
            list = menu::Entity::find()
                .filter(menu::Column::Id.is_in(ids))
                .order_by_desc(menu::Column::Sequence)
                .order_by_asc(menu::Column::CreatedAt)
                .all(&self.db)
                .await?;
        }

        Ok(to_tree(list))
    }

    /// Menu with its actions and their resources
    pub async fn get(&self, id: &str) -> AppResult<MenuDetail> {
        let menu = menu::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .ok_or_not_found("Menu not found")?;
        let actions = load_actions(&self.db, id).await?;
        Ok(MenuDetail { menu, actions })
    }

    pub async fn create(&self, form: MenuForm, by: &str) -> AppResult<MenuDetail> {
        form.validate()?;

        let id = new_id();
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let (parent_path, status) = match form.parent_id() {
            Some(parent_id) => {
                let (path, parent_status) = resolve_parent(&txn, parent_id).await?;
                (Some(path), inherit_status(form.status, parent_status))
            }
            None => (None, form.status),
        };

        menu::ActiveModel {
            id: Set(id.clone()),
            name: Set(form.name.clone()),
            sequence: Set(form.sequence),
            icon: Set(form.icon.clone()),
            link: Set(form.link.clone()),
            parent_id: Set(form.parent_id().map(str::to_string)),
            parent_path: Set(parent_path),
            status: Set(status),
            hide: Set(form.hide),
            created_at: Set(now),
            updated_at: Set(now),
            created_by: Set(by.to_string()),
            updated_by: Set(by.to_string()),
        }
        .insert(&txn)
        .await?;

        for action in &form.actions {
            insert_action(&txn, &id, action).await?;
        }

        txn.commit().await?;
        notify_menu_changed(self.cache.as_ref()).await?;

        info!("Menu created: {} ({})", form.name, id);
        self.get(&id).await
    }

    pub async fn update(&self, id: &str, form: MenuForm, by: &str) -> AppResult<MenuDetail> {
        form.validate()?;
        if form.parent_id() == Some(id) {
            return Err(AppError::BadRequest("A menu cannot be its own parent".to_string()));
        }

        let txn = self.db.begin().await?;
        let old = menu::Entity::find_by_id(id.to_string())
            .one(&txn)
            .await?
            .ok_or_not_found("Menu not found")?;
        let old_prefix = old.child_prefix();

        let mut status = form.status;
        let parent_path = if form.parent_id() == old.parent_id.as_deref() {
            old.parent_path.clone()
        } else {
            match form.parent_id() {
                Some(parent_id) => {
                    let (path, parent_status) = resolve_parent(&txn, parent_id).await?;
                    // The new parent sits inside this node's own subtree
                    if path.starts_with(&old_prefix) {
                        return Err(AppError::BadRequest(
                            "A menu cannot be moved under its own descendant".to_string(),
                        ));
                    }
                    status = inherit_status(status, parent_status);
                    Some(path)
                }
                None => None,
            }
        };
        let new_prefix = menu::child_prefix(parent_path.as_deref(), id);
        let status_changed = old.status != status;

        let mut am: menu::ActiveModel = old.into();
        am.name = Set(form.name.clone());
        am.sequence = Set(form.sequence);
        am.icon = Set(form.icon.clone());
        am.link = Set(form.link.clone());
        am.parent_id = Set(form.parent_id().map(str::to_string));
        am.parent_path = Set(parent_path);
        am.status = Set(status);
        am.hide = Set(form.hide);
        am.updated_at = Set(Utc::now());
        am.updated_by = Set(by.to_string());
        am.update(&txn).await?;

        if new_prefix != old_prefix {
            let moved = rewrite_descendant_paths(&txn, &old_prefix, &new_prefix).await?;
            info!("Menu {} re-parented, {} descendant paths rewritten", id, moved);
        }
        if status_changed {
            set_subtree_status(&txn, &new_prefix, status, by).await?;
        }

        sync_actions(&txn, id, &form.actions).await?;

        txn.commit().await?;
        notify_menu_changed(self.cache.as_ref()).await?;

        info!("Menu updated: {} ({})", form.name, id);
        self.get(id).await
    }

    /// Delete the menu, its whole subtree, their actions, resources and grants
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let txn = self.db.begin().await?;
        let node = menu::Entity::find_by_id(id.to_string())
            .one(&txn)
            .await?
            .ok_or_not_found("Menu not found")?;

        let mut ids = descendant_ids(&txn, &node.child_prefix()).await?;
        ids.push(node.id.clone());

        menu_action_resource::Entity::delete_many()
            .filter(menu_action_resource::Column::MenuId.is_in(ids.clone()))
            .exec(&txn)
            .await?;
        menu_action::Entity::delete_many()
            .filter(menu_action::Column::MenuId.is_in(ids.clone()))
            .exec(&txn)
            .await?;
        role_menu::Entity::delete_many()
            .filter(role_menu::Column::MenuId.is_in(ids.clone()))
            .exec(&txn)
            .await?;
        menu::Entity::delete_many()
            .filter(menu::Column::Id.is_in(ids.clone()))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        notify_menu_changed(self.cache.as_ref()).await?;

        info!("Menu deleted: {} ({} menus removed)", id, ids.len());
        Ok(())
    }

    /// Enable or disable the menu together with its subtree
    pub async fn update_status(&self, id: &str, status: Status, by: &str) -> AppResult<()> {
        let txn = self.db.begin().await?;
        let node = menu::Entity::find_by_id(id.to_string())
            .one(&txn)
            .await?
            .ok_or_not_found("Menu not found")?;

        let prefix = node.child_prefix();
        let mut am: menu::ActiveModel = node.into();
        am.status = Set(status);
        am.updated_at = Set(Utc::now());
        am.updated_by = Set(by.to_string());
        am.update(&txn).await?;
        let affected = set_subtree_status(&txn, &prefix, status, by).await?;

        txn.commit().await?;
        notify_menu_changed(self.cache.as_ref()).await?;

        info!("Menu {} set to {:?} ({} descendants)", id, status, affected);
        Ok(())
    }
}

/// Assemble a forest from a flat list. Nodes whose parent is absent from the
/// list become roots; sibling order is the list order.
pub fn to_tree(list: Vec<menu::Model>) -> Vec<MenuTree> {
    let present: HashSet<String> = list.iter().map(|m| m.id.clone()).collect();

    let mut roots = Vec::new();
    let mut children: HashMap<String, Vec<MenuTree>> = HashMap::new();
    for model in list {
        match model.parent_id.clone().filter(|p| present.contains(p)) {
            Some(parent_id) => children.entry(parent_id).or_default().push(model.into()),
            None => roots.push(MenuTree::from(model)),
        }
    }

    attach_children(&mut roots, &mut children);
    roots
}

fn attach_children(nodes: &mut [MenuTree], children: &mut HashMap<String, Vec<MenuTree>>) {
    for node in nodes.iter_mut() {
        if let Some(mut kids) = children.remove(&node.id) {
            attach_children(&mut kids, children);
            node.children = kids;
        }
    }
}

/// Own ids plus every ancestor id, deduplicated, ancestors first
pub fn split_parent_ids(list: &[menu::Model]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for model in list {
        for id in model.ancestor_ids().into_iter().chain([model.id.as_str()]) {
            if seen.insert(id) {
                ids.push(id.to_string());
            }
        }
    }
    ids
}

/// Replace `old_prefix` with `new_prefix` in every descendant's parent_path
pub async fn rewrite_descendant_paths<C: ConnectionTrait>(
    db: &C,
    old_prefix: &str,
    new_prefix: &str,
) -> AppResult<usize> {
    let descendants = menu::Entity::find()
        .filter(menu::Column::ParentPath.starts_with(old_prefix))
        .all(db)
        .await?;

    let mut rewritten = 0;
    for model in descendants {
        let new_path = match model.parent_path.as_deref().and_then(|p| p.strip_prefix(old_prefix)) {
            Some(rest) => format!("{}{}", new_prefix, rest),
            None => continue,
        };
        let mut am: menu::ActiveModel = model.into();
        am.parent_path = Set(Some(new_path));
        am.update(db).await?;
        rewritten += 1;
    }
    Ok(rewritten)
}

/// `parent_path` a child of `parent_id` gets; NotFound if the parent is missing
/// Child prefix and status of the parent menu
async fn resolve_parent<C: ConnectionTrait>(db: &C, parent_id: &str) -> AppResult<(String, Status)> {
    let (id, parent_path, status) = menu::Entity::find_by_id(parent_id.to_string())
        .select_only()
        .column(menu::Column::Id)
        .column(menu::Column::ParentPath)
        .column(menu::Column::Status)
        .into_tuple::<(String, Option<String>, Status)>()
        .one(db)
        .await?
        .ok_or_not_found("Parent menu not found")?;
    Ok((menu::child_prefix(parent_path.as_deref(), &id), status))
}

/// A node placed under a disabled parent is disabled too
fn inherit_status(requested: Status, parent: Status) -> Status {
    match parent {
        Status::Disabled => Status::Disabled,
        Status::Enabled => requested,
    }
}

/// Ids of all menus under `prefix`
async fn descendant_ids<C: ConnectionTrait>(db: &C, prefix: &str) -> AppResult<Vec<String>> {
    let rows: Vec<(String, Option<String>)> = menu::Entity::find()
        .select_only()
        .column(menu::Column::Id)
        .column(menu::Column::ParentPath)
        .filter(menu::Column::ParentPath.starts_with(prefix))
        .into_tuple()
        .all(db)
        .await?;
    Ok(rows
        .into_iter()
        .filter(|(_, path)| path.as_deref().is_some_and(|p| p.starts_with(prefix)))
        .map(|(id, _)| id)
        .collect())
}

async fn set_subtree_status<C: ConnectionTrait>(
    db: &C,
    prefix: &str,
    status: Status,
    by: &str,
) -> AppResult<usize> {
    let ids = descendant_ids(db, prefix).await?;
    if ids.is_empty() {
        return Ok(0);
    }
    menu::Entity::update_many()
        .col_expr(menu::Column::Status, Expr::value(status))
        .col_expr(menu::Column::UpdatedAt, Expr::value(Utc::now()))
        .col_expr(menu::Column::UpdatedBy, Expr::value(by))
        .filter(menu::Column::Id.is_in(ids.clone()))
        .exec(db)
        .await?;
    Ok(ids.len())
}

async fn load_actions<C: ConnectionTrait>(db: &C, menu_id: &str) -> AppResult<Vec<MenuActionDetail>> {
    let actions = menu_action::Entity::find()
        .filter(menu_action::Column::MenuId.eq(menu_id))
        .order_by_asc(menu_action::Column::Code)
        .all(db)
        .await?;
    let resources = menu_action_resource::Entity::find()
        .filter(menu_action_resource::Column::MenuId.eq(menu_id))
        .order_by_asc(menu_action_resource::Column::Path)
        .order_by_asc(menu_action_resource::Column::Method)
        .all(db)
        .await?;

    let mut by_action: HashMap<String, Vec<menu_action_resource::Model>> = HashMap::new();
    for res in resources {
        by_action.entry(res.action_id.clone()).or_default().push(res);
    }

    Ok(actions
        .into_iter()
        .map(|action| {
            let resources = by_action.remove(&action.id).unwrap_or_default();
            MenuActionDetail::new(action, resources)
        })
        .collect())
}

async fn insert_action<C: ConnectionTrait>(db: &C, menu_id: &str, form: &MenuActionForm) -> AppResult<()> {
    let action_id = new_id();
    menu_action::ActiveModel {
        id: Set(action_id.clone()),
        menu_id: Set(menu_id.to_string()),
        code: Set(form.code.clone()),
        name: Set(form.name.clone()),
    }
    .insert(db)
    .await?;
    insert_resources(db, menu_id, &action_id, &form.resources).await
}

async fn insert_resources<C: ConnectionTrait>(
    db: &C,
    menu_id: &str,
    action_id: &str,
    resources: &[ResourceForm],
) -> AppResult<()> {
    for res in resources {
        menu_action_resource::ActiveModel {
            id: Set(new_id()),
            menu_id: Set(menu_id.to_string()),
            action_id: Set(action_id.to_string()),
            method: Set(res.method.trim().to_ascii_uppercase()),
            path: Set(res.path.trim().to_string()),
        }
        .insert(db)
        .await?;
    }
    Ok(())
}

/// Reconcile stored actions with the payload, matching by code
async fn sync_actions<C: ConnectionTrait>(db: &C, menu_id: &str, forms: &[MenuActionForm]) -> AppResult<()> {
    let existing = menu_action::Entity::find()
        .filter(menu_action::Column::MenuId.eq(menu_id))
        .all(db)
        .await?;
    let mut by_code: HashMap<String, menu_action::Model> =
        existing.into_iter().map(|a| (a.code.clone(), a)).collect();

    for form in forms {
        match by_code.remove(&form.code) {
            Some(action) => {
                menu_action_resource::Entity::delete_many()
                    .filter(menu_action_resource::Column::ActionId.eq(action.id.clone()))
                    .exec(db)
                    .await?;
                insert_resources(db, menu_id, &action.id, &form.resources).await?;
                if action.name != form.name {
                    let mut am: menu_action::ActiveModel = action.into();
                    am.name = Set(form.name.clone());
                    am.update(db).await?;
                }
            }
            None => insert_action(db, menu_id, form).await?,
        }
    }

    // Whatever is left was dropped from the payload
    let removed: Vec<String> = by_code.into_values().map(|a| a.id).collect();
    if !removed.is_empty() {
        menu_action_resource::Entity::delete_many()
            .filter(menu_action_resource::Column::ActionId.is_in(removed.clone()))
            .exec(db)
            .await?;
        role_menu::Entity::delete_many()
            .filter(role_menu::Column::ActionId.is_in(removed.clone()))
            .exec(db)
            .await?;
        menu_action::Entity::delete_many()
            .filter(menu_action::Column::Id.is_in(removed))
            .exec(db)
            .await?;
    }
    Ok(())
}
