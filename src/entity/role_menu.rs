//! RoleMenu entity - 角色菜单关系表
//!
//! 表名: role_menu
//!
//! Pure join rows; replaced wholesale whenever the owning role is updated.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "role_menu")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "String(Some(32))")]
    pub id: String,

    #[sea_orm(column_type = "String(Some(32))", indexed)]
    pub role_id: String,

    #[sea_orm(column_type = "String(Some(32))", indexed)]
    pub menu_id: String,

    /// 授权的菜单动作ID
    #[sea_orm(column_type = "String(Some(32))")]
    pub action_id: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
