pub mod auth;
pub mod cookies;

pub use auth::{configure, health_check, login, logout, refresh, register};
