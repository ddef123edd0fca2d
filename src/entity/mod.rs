//! Entity module - SeaORM 实体定义
//!
//! 菜单层级、权限图 (角色/菜单/动作/资源) 与用户表

pub mod menu;
pub mod menu_action;
pub mod menu_action_resource;
pub mod role;
pub mod role_menu;
pub mod status;
pub mod user;
pub mod user_role;

pub use status::{Status, UserStatus};

/// Generate a new opaque row id (32 hex chars, never contains the path delimiter)
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_id_is_opaque_hex() {
        let id = new_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!id.contains(menu::PATH_DELIMITER));
        assert_ne!(id, new_id());
    }
}
