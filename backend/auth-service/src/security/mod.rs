/// Security module for authentication
/// Provides password hashing; token issuance lives in crypto-core
pub mod password;

pub use password::{hash_password, verify_password};
