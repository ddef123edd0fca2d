//! User entity - 用户表
//!
//! 表名: user

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::UserStatus;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "String(Some(32))")]
    pub id: String,

    /// 用户名 (唯一)
    #[sea_orm(column_type = "String(Some(64))", unique)]
    pub username: String,

    /// 姓名
    #[sea_orm(column_type = "String(Some(64))")]
    pub name: String,

    /// 密码 (bcrypt 哈希)
    #[sea_orm(column_type = "String(Some(128))")]
    #[serde(skip_serializing)]
    pub password: String,

    /// 邮箱
    #[sea_orm(column_type = "String(Some(128))", nullable)]
    pub email: Option<String>,

    /// 备注
    #[sea_orm(column_type = "String(Some(1024))")]
    pub remark: String,

    /// 用户状态: activated / freezed
    pub status: UserStatus,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,

    #[sea_orm(column_type = "String(Some(32))")]
    pub created_by: String,
    #[sea_orm(column_type = "String(Some(32))")]
    pub updated_by: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

// 跨模块关系通过手动查询处理，避免循环依赖

impl ActiveModelBehavior for ActiveModel {}

/// 用户响应 (不含密码)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub name: String,
    pub email: Option<String>,
    pub remark: String,
    pub status: UserStatus,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    /// 用户角色ID (由 user_role 表填充)
    pub role_ids: Vec<String>,
}

impl From<Model> for UserResponse {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            name: model.name,
            email: model.email,
            remark: model.remark,
            status: model.status,
            created_at: model.created_at,
            updated_at: model.updated_at,
            role_ids: Vec::new(), // Filled in by the service from user_role
        }
    }
}

impl UserResponse {
    pub fn with_role_ids(mut self, role_ids: Vec<String>) -> Self {
        self.role_ids = role_ids;
        self
    }
}
