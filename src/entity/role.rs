//! Role entity - 角色表
//!
//! 表名: role
//!
//! `updated_at` doubles as the change watermark the policy synchronizer scans.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::{role_menu, Status};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "role")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "String(Some(32))")]
    pub id: String,

    /// 角色名称 (唯一)
    #[sea_orm(column_type = "String(Some(128))", unique)]
    pub name: String,

    pub sequence: i32,

    pub status: Status,

    #[sea_orm(column_type = "String(Some(1024))")]
    pub remark: String,

    pub created_at: DateTimeUtc,
    #[sea_orm(indexed)]
    pub updated_at: DateTimeUtc,

    #[sea_orm(column_type = "String(Some(32))")]
    pub created_by: String,
    #[sea_orm(column_type = "String(Some(32))")]
    pub updated_by: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// 角色详情 (含授权的菜单动作)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoleDetail {
    #[serde(flatten)]
    pub role: Model,
    pub menus: Vec<role_menu::Model>,
}
