//! Permission graph services
//!
//! Each service owns a database handle plus the shared cache; handlers stay
//! thin and call into these.

pub mod login_service;
pub mod menu_service;
pub mod role_service;
pub mod user_service;

pub use login_service::{LoginForm, LoginService, LoginUser};
pub use menu_service::{MenuForm, MenuQuery, MenuService};
pub use role_service::{RoleForm, RoleQuery, RoleService};
pub use user_service::{UserForm, UserQuery, UserService};

use std::collections::HashSet;

use crate::cache::{ns, Cacher};
use crate::error::{AppError, AppResult};

/// Drop the role memo of every listed user
pub(crate) async fn invalidate_user_roles<I, S>(cache: &dyn Cacher, user_ids: I) -> AppResult<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    for id in user_ids {
        cache.delete(ns::USER_ROLE, id.as_ref()).await?;
        tracing::debug!("Invalidated role cache for user {}", id.as_ref());
    }
    Ok(())
}

/// Reject blank required fields
pub(crate) fn require(value: &str, field: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Order-preserving dedupe
pub(crate) fn dedup_ids(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}
