pub mod relationship;

pub use relationship::{FollowPlan, Relationship, RelationshipStatus, RelationshipType};
