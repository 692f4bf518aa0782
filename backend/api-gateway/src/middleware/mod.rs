pub mod edge_auth;

pub use edge_auth::{is_websocket_request, EdgeAuth};
