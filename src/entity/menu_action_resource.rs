//! MenuActionResource entity - 动作接口资源表
//!
//! 表名: menu_action_resource
//!
//! One row per HTTP method + path reachable through an action. These rows are
//! what the policy synchronizer turns into enforcement rules.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "menu_action_resource")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "String(Some(32))")]
    pub id: String,

    #[sea_orm(column_type = "String(Some(32))", indexed)]
    pub menu_id: String,

    #[sea_orm(column_type = "String(Some(32))", indexed)]
    pub action_id: String,

    /// HTTP 方法
    #[sea_orm(column_type = "String(Some(16))")]
    pub method: String,

    /// 接口路径 (支持 :id 占位)
    #[sea_orm(column_type = "String(Some(255))")]
    pub path: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether the row can be written as a policy line
    pub fn is_policy_safe(&self) -> bool {
        is_valid_method(&self.method) && is_valid_path(&self.path)
    }
}

/// A bare token such as `GET`
pub fn is_valid_method(method: &str) -> bool {
    !method.is_empty() && method.bytes().all(|b| b.is_ascii_alphabetic())
}

/// An absolute route path. Separators, quotes and whitespace would change
/// the shape of the CSV policy file and are rejected.
pub fn is_valid_path(path: &str) -> bool {
    path.starts_with('/')
        && !path
            .chars()
            .any(|c| c == ',' || c == '"' || c.is_whitespace() || c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_validators() {
        assert!(is_valid_method("GET"));
        assert!(is_valid_method("patch"));
        assert!(!is_valid_method(""));
        assert!(!is_valid_method("GET,"));
        assert!(!is_valid_method("GET\np"));

        assert!(is_valid_path("/api/v1/widgets/:id"));
        assert!(is_valid_path("/"));
        assert!(!is_valid_path(""));
        assert!(!is_valid_path("api/v1/widgets"));
        assert!(!is_valid_path("/api/v1/x, GET"));
        assert!(!is_valid_path("/api/v1/x\np, r, /y, GET"));
        assert!(!is_valid_path("/api/v1/\"x\""));
        assert!(!is_valid_path("/api/v1/x\ty"));
    }
}
