//! Request handlers module

pub mod auth;
pub mod menu;
pub mod role;
pub mod user;
