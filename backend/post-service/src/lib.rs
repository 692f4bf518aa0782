// Post Service Library

pub mod config;
pub mod consumers;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod services;

pub use services::{MediaService, PostService};
