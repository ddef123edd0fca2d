//! Status enums shared by menu, role and user tables

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 菜单/角色状态
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    #[sea_orm(string_value = "enabled")]
    Enabled,
    #[sea_orm(string_value = "disabled")]
    Disabled,
}

/// 用户状态
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// 正常
    #[default]
    #[sea_orm(string_value = "activated")]
    Activated,
    /// 冻结
    #[sea_orm(string_value = "freezed")]
    Freezed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serde() {
        assert_eq!(serde_json::to_string(&Status::Disabled).unwrap(), "\"disabled\"");
        let s: UserStatus = serde_json::from_str("\"freezed\"").unwrap();
        assert_eq!(s, UserStatus::Freezed);
    }
}
