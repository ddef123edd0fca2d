//! Menu entity - 菜单表
//!
//! 表名: menu
//!
//! `parent_path` is a materialized path: every ancestor id from the root down
//! to the parent, each followed by [`PATH_DELIMITER`]. Roots store NULL.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::menu_action::MenuActionDetail;
use super::Status;

/// Separator appended after every id in a materialized path
pub const PATH_DELIMITER: &str = ".";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "menu")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "String(Some(32))")]
    pub id: String,

    /// 菜单名称
    #[sea_orm(column_type = "String(Some(128))")]
    pub name: String,

    /// 排序值 (降序)
    pub sequence: i32,

    /// 图标
    #[sea_orm(column_type = "String(Some(255))")]
    pub icon: String,

    /// 访问路由
    #[sea_orm(column_type = "String(Some(255))")]
    pub link: String,

    /// 父级ID (NULL 表示顶级菜单)
    #[sea_orm(column_type = "String(Some(32))", nullable)]
    pub parent_id: Option<String>,

    /// 父级路径
    #[sea_orm(column_type = "Text", nullable)]
    pub parent_path: Option<String>,

    pub status: Status,

    /// 是否隐藏
    pub hide: bool,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,

    #[sea_orm(column_type = "String(Some(32))")]
    pub created_by: String,
    #[sea_orm(column_type = "String(Some(32))")]
    pub updated_by: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

// 自引用关系通过 parent_path 前缀查询处理

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Prefix shared by the parent_path of every descendant of this node
    pub fn child_prefix(&self) -> String {
        child_prefix(self.parent_path.as_deref(), &self.id)
    }

    /// Ancestor ids, root first
    pub fn ancestor_ids(&self) -> Vec<&str> {
        split_path(self.parent_path.as_deref())
    }
}

/// `parent_path + id + delimiter`
pub fn child_prefix(parent_path: Option<&str>, id: &str) -> String {
    format!("{}{}{}", parent_path.unwrap_or_default(), id, PATH_DELIMITER)
}

pub fn split_path(parent_path: Option<&str>) -> Vec<&str> {
    parent_path
        .unwrap_or_default()
        .split(PATH_DELIMITER)
        .filter(|s| !s.is_empty())
        .collect()
}

/// 菜单详情 (含按钮动作与接口资源)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MenuDetail {
    #[serde(flatten)]
    pub menu: Model,
    pub actions: Vec<MenuActionDetail>,
}

/// 菜单树节点 (用于API响应)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MenuTree {
    pub id: String,
    pub name: String,
    pub sequence: i32,
    pub icon: String,
    pub link: String,
    pub parent_id: Option<String>,
    pub parent_path: Option<String>,
    pub status: Status,
    pub hide: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<MenuTree>,
}

impl From<Model> for MenuTree {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            sequence: model.sequence,
            icon: model.icon,
            link: model.link,
            parent_id: model.parent_id,
            parent_path: model.parent_path,
            status: model.status,
            hide: model.hide,
            children: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_prefix() {
        assert_eq!(child_prefix(None, "a"), "a.");
        assert_eq!(child_prefix(Some("a.b."), "c"), "a.b.c.");
    }

    #[test]
    fn test_split_path() {
        assert!(split_path(None).is_empty());
        assert!(split_path(Some("")).is_empty());
        assert_eq!(split_path(Some("a.b.")), vec!["a", "b"]);
    }
}
