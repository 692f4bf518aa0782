pub mod media_service;
pub mod post_service;

pub use media_service::MediaService;
pub use post_service::PostService;

/// Consumer group and event source name.
pub const SERVICE_NAME: &str = "post-service";
