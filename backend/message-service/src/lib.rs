// Message Service Library

pub mod config;
pub mod handlers;
pub mod models;
pub mod registry;
pub mod repository;
pub mod services;
pub mod ws;

pub use registry::ConnectionRegistry;
pub use services::ChatService;
