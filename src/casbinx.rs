//! Policy synchronizer using Casbin
//!
//! The relational role/menu/action/resource graph is the only source of truth.
//! `load()` renders it into a CSV policy file and builds a fresh enforcer from
//! that file; the published enforcer is swapped by reference, so a permission
//! check in flight keeps the instance it started with.

use casbin::{CoreApi, DefaultModel, Enforcer, FileAdapter, MemoryAdapter};
use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::{ns, Cacher};
use crate::config::CasbinConfig;
use crate::entity::{menu, menu_action_resource, role, role_menu, Status};
use crate::error::AppResult;

/// Model written to `model_file` when none exists
pub const DEFAULT_MODEL: &str = r#"[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = r.sub == p.sub && keyMatch2(r.obj, p.obj) && r.act == p.act
"#;

/// One `p, <role>, <path>, <method>` line
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PolicyRule {
    pub role: String,
    pub path: String,
    pub method: String,
}

impl PolicyRule {
    pub fn to_line(&self) -> String {
        format!("p, {}, {}, {}", self.role, self.path, self.method)
    }
}

/// Flag a role as gone from the enforced set (deleted or disabled)
pub async fn notify_role_removed(cache: &dyn Cacher) -> AppResult<()> {
    cache.set(ns::ROLE, ns::KEY_ROLE_DELETED, "1", None).await
}

/// Flag a change to menus, actions or resources
pub async fn notify_menu_changed(cache: &dyn Cacher) -> AppResult<()> {
    cache.set(ns::MENU, ns::KEY_MENU_CHANGED, "1", None).await
}

/// Policy synchronizer wrapper
#[derive(Clone)]
pub struct Casbinx {
    db: DatabaseConnection,
    cache: Arc<dyn Cacher>,
    model_file: PathBuf,
    policy_file: PathBuf,
    interval: Duration,
    enforcer: Arc<RwLock<Arc<Enforcer>>>,
    /// Newest enabled-role `updated_at` already reflected in the policy
    watermark: Arc<Mutex<Option<DateTime<Utc>>>>,
    /// Serialises file writes between concurrent reloads
    load_lock: Arc<Mutex<()>>,
}

impl Casbinx {
    /// Create the synchronizer and perform the first load
    pub async fn new(
        db: DatabaseConnection,
        cache: Arc<dyn Cacher>,
        config: &CasbinConfig,
    ) -> AppResult<Self> {
        ensure_model_file(&config.model_file).await?;

        // Deny everything until the first load publishes real rules
        let model = DefaultModel::from_file(&config.model_file).await?;
        let empty = Enforcer::new(model, MemoryAdapter::default()).await?;

        let casbinx = Self {
            db,
            cache,
            model_file: config.model_file.clone(),
            policy_file: config.policy_file.clone(),
            interval: config.interval(),
            enforcer: Arc::new(RwLock::new(Arc::new(empty))),
            watermark: Arc::new(Mutex::new(None)),
            load_lock: Arc::new(Mutex::new(())),
        };

        let latest = casbinx.newest_enabled_role(None).await?;
        casbinx.load().await?;
        *casbinx.watermark.lock().await = latest.map(|r| r.updated_at);

        Ok(casbinx)
    }

    /// Currently published enforcer
    pub async fn get_enforcer(&self) -> Arc<Enforcer> {
        self.enforcer.read().await.clone()
    }

    /// Check `(role, path, method)` against the published rules
    pub async fn enforce(&self, role: &str, path: &str, method: &str) -> AppResult<bool> {
        let enforcer = self.get_enforcer().await;
        Ok(enforcer.enforce((role, path, method))?)
    }

    /// Regenerate the policy file from the database and swap in a new enforcer.
    /// On failure the previous enforcer stays published.
    pub async fn load(&self) -> AppResult<usize> {
        let _guard = self.load_lock.lock().await;
        let started = std::time::Instant::now();

        let rules = query_policy_rules(&self.db).await?;
        self.write_policy_file(&rules).await?;

        let model = DefaultModel::from_file(&self.model_file).await?;
        let adapter = FileAdapter::new(self.policy_file.clone());
        let enforcer = Enforcer::new(model, adapter).await?;

        *self.enforcer.write().await = Arc::new(enforcer);

        tracing::info!(
            "Casbin policy loaded: {} rules in {}ms",
            rules.len(),
            started.elapsed().as_millis()
        );
        Ok(rules.len())
    }

    /// One auto-load iteration; returns whether a reload happened
    pub async fn tick(&self) -> AppResult<bool> {
        let watermark = *self.watermark.lock().await;

        if let Some(newest) = self.newest_enabled_role(watermark).await? {
            self.load().await?;
            *self.watermark.lock().await = Some(newest.updated_at);
            tracing::debug!("Reloaded policy after role {} changed", newest.id);
            return Ok(true);
        }

        // Deletion never touches a surviving row, so it is signalled separately
        let role_removed = self
            .cache
            .get_and_delete(ns::ROLE, ns::KEY_ROLE_DELETED)
            .await?
            .is_some();
        let menu_changed = self
            .cache
            .get_and_delete(ns::MENU, ns::KEY_MENU_CHANGED)
            .await?
            .is_some();

        if !role_removed && !menu_changed {
            return Ok(false);
        }

        if let Err(e) = self.load().await {
            // Put the signals back so the next tick retries
            if role_removed {
                notify_role_removed(self.cache.as_ref()).await?;
            }
            if menu_changed {
                notify_menu_changed(self.cache.as_ref()).await?;
            }
            return Err(e);
        }
        tracing::debug!(
            "Reloaded policy (role removed: {}, menu changed: {})",
            role_removed,
            menu_changed
        );
        Ok(true)
    }

    /// Run `tick` on a timer until `shutdown` is cancelled
    pub fn auto_load(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.interval);
            // The first tick completes immediately; the initial load already ran
            ticker.tick().await;

            tracing::info!("Casbin auto-load started, interval {:?}", this.interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("Casbin auto-load stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = this.tick().await {
                            tracing::error!("Casbin auto-load failed: {}", e);
                        }
                    }
                }
            }
        })
    }

    async fn newest_enabled_role(
        &self,
        after: Option<DateTime<Utc>>,
    ) -> AppResult<Option<role::Model>> {
        let mut query = role::Entity::find().filter(role::Column::Status.eq(Status::Enabled));
        if let Some(after) = after {
            query = query.filter(role::Column::UpdatedAt.gt(after));
        }
        Ok(query
            .order_by_desc(role::Column::UpdatedAt)
            .one(&self.db)
            .await?)
    }

    /// Write `<policy>.tmp`, keep the old file as `<policy>.bak`, move the new
    /// file into place and mark it read-only.
    async fn write_policy_file(&self, rules: &[PolicyRule]) -> AppResult<()> {
        if let Some(dir) = self.policy_file.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }

        let mut content = String::new();
        for rule in rules {
            content.push_str(&rule.to_line());
            content.push('\n');
        }

        let tmp = with_suffix(&self.policy_file, ".tmp");
        tokio::fs::write(&tmp, content).await?;

        if tokio::fs::try_exists(&self.policy_file).await? {
            tokio::fs::rename(&self.policy_file, with_suffix(&self.policy_file, ".bak")).await?;
        }
        tokio::fs::rename(&tmp, &self.policy_file).await?;

        let mut perms = tokio::fs::metadata(&self.policy_file).await?.permissions();
        perms.set_readonly(true);
        tokio::fs::set_permissions(&self.policy_file, perms).await?;

        Ok(())
    }
}

/// Every distinct `(role, path, method)` reachable from an enabled role
/// through role_menu -> action -> resource, skipping disabled menus.
pub async fn query_policy_rules<C: ConnectionTrait>(db: &C) -> AppResult<Vec<PolicyRule>> {
    let role_ids: Vec<String> = role::Entity::find()
        .select_only()
        .column(role::Column::Id)
        .filter(role::Column::Status.eq(Status::Enabled))
        .order_by_desc(role::Column::Sequence)
        .order_by_asc(role::Column::Id)
        .into_tuple()
        .all(db)
        .await?;
    if role_ids.is_empty() {
        return Ok(Vec::new());
    }

    let role_menus = role_menu::Entity::find()
        .filter(role_menu::Column::RoleId.is_in(role_ids.clone()))
        .all(db)
        .await?;
    let action_ids: HashSet<&str> = role_menus.iter().map(|rm| rm.action_id.as_str()).collect();
    if action_ids.is_empty() {
        return Ok(Vec::new());
    }

    let resources = menu_action_resource::Entity::find()
        .filter(menu_action_resource::Column::ActionId.is_in(action_ids.iter().copied()))
        .order_by_asc(menu_action_resource::Column::Path)
        .order_by_asc(menu_action_resource::Column::Method)
        .all(db)
        .await?;

    let enabled_menus: HashSet<String> = menu::Entity::find()
        .select_only()
        .column(menu::Column::Id)
        .filter(menu::Column::Status.eq(Status::Enabled))
        .into_tuple::<String>()
        .all(db)
        .await?
        .into_iter()
        .collect();

    let mut by_action: HashMap<&str, Vec<&menu_action_resource::Model>> = HashMap::new();
    for res in &resources {
        if !enabled_menus.contains(&res.menu_id) {
            continue;
        }
        if !res.is_policy_safe() {
            tracing::warn!(
                "Skipping resource {} with unusable method {:?} or path {:?}",
                res.id,
                res.method,
                res.path
            );
            continue;
        }
        by_action.entry(res.action_id.as_str()).or_default().push(res);
    }

    let mut by_role: HashMap<&str, Vec<&str>> = HashMap::new();
    for rm in &role_menus {
        by_role.entry(rm.role_id.as_str()).or_default().push(rm.action_id.as_str());
    }

    let mut seen = HashSet::new();
    let mut rules = Vec::new();
    for role_id in &role_ids {
        let Some(actions) = by_role.get(role_id.as_str()) else {
            continue;
        };
        for action_id in actions {
            for res in by_action.get(action_id).into_iter().flatten() {
                let rule = PolicyRule {
                    role: role_id.clone(),
                    path: res.path.clone(),
                    method: res.method.clone(),
                };
                if seen.insert(rule.clone()) {
                    rules.push(rule);
                }
            }
        }
    }

    Ok(rules)
}

async fn ensure_model_file(path: &Path) -> AppResult<()> {
    if tokio::fs::try_exists(path).await? {
        return Ok(());
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(path, DEFAULT_MODEL).await?;
    tracing::info!("Wrote default casbin model to {}", path.display());
    Ok(())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}
