pub mod profile_projection;

pub use profile_projection::ProfileProjectionHandler;
