pub mod auth_events;

pub use auth_events::AuthEventsHandler;
