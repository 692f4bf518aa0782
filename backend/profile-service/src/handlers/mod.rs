pub mod profile;

pub use profile::{configure, health_check};
