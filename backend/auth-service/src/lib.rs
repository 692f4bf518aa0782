// Auth Service Library

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod security;
pub mod services;
pub mod validators;

pub use error::{AuthError, AuthResult};
pub use services::AuthService;
