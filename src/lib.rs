//! RBAC admin - role based access control backend
//!
//! This crate provides the menu hierarchy, the role/menu/action/resource
//! permission graph, JWT sessions with revocation, and the Casbin policy
//! synchronizer that keeps enforcement in step with the database.

pub mod cache;
pub mod casbinx;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod jwt;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, AppResult};
pub use state::AppState;
