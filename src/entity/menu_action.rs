//! MenuAction entity - 菜单动作表 (按钮级权限)
//!
//! 表名: menu_action

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::menu_action_resource;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "menu_action")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "String(Some(32))")]
    pub id: String,

    #[sea_orm(column_type = "String(Some(32))", indexed)]
    pub menu_id: String,

    /// 动作编号 (菜单内唯一)
    #[sea_orm(column_type = "String(Some(64))")]
    pub code: String,

    #[sea_orm(column_type = "String(Some(128))")]
    pub name: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// 动作详情 (含接口资源)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MenuActionDetail {
    pub id: String,
    pub code: String,
    pub name: String,
    pub resources: Vec<menu_action_resource::Model>,
}

impl MenuActionDetail {
    pub fn new(action: Model, resources: Vec<menu_action_resource::Model>) -> Self {
        Self {
            id: action.id,
            code: action.code,
            name: action.name,
            resources,
        }
    }
}
