pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use error_types::Result;
use transactional_outbox::OutboxEvent;
use uuid::Uuid;

use crate::domain::{FollowPlan, Relationship};
use crate::models::{PageRequest, Profile, UpdateProfileRequest};

pub use memory::MemoryProfileRepository;
pub use postgres::PgProfileRepository;

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Creates the profile of a registered account. An existing row is left
    /// as it is: redelivered registrations must not undo later updates.
    /// Rows are never deleted.
    async fn insert_registered(&self, id: Uuid, full_name: &str) -> Result<()>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Profile>>;

    async fn list(&self, page: &PageRequest) -> Result<Vec<Profile>>;

    /// Case-insensitive substring match on full or nick name.
    async fn search(&self, name: &str, limit: i64) -> Result<Vec<Profile>>;

    /// Applies the update and queues `event` in one transaction. `None`
    /// means the profile does not exist and nothing was written.
    async fn update_with_event(
        &self,
        update: &UpdateProfileRequest,
        event: &OutboxEvent,
    ) -> Result<Option<Profile>>;

    /// Decides and applies a [`FollowPlan`] while holding the pair lock.
    /// Both profiles must exist.
    async fn follow(&self, subject: Uuid, target: Uuid) -> Result<FollowPlan>;

    /// Outgoing FOLLOWING and FRIEND edges.
    async fn count_followings(&self, id: Uuid) -> Result<i64>;

    /// Targets of outgoing FRIEND edges.
    async fn friends(&self, id: Uuid) -> Result<Vec<Profile>>;

    async fn edges_from(&self, id: Uuid) -> Result<Vec<Relationship>>;

    async fn edges_to(&self, id: Uuid) -> Result<Vec<Relationship>>;
}
