//! Consumer for auth-service events
//!
//! `auth.user.event` -> upsert the profile keyed by account id. Redelivery
//! rewrites the same row, so handling is idempotent.

use anyhow::Result;
use async_trait::async_trait;
use event_bus::{EventHandler, EventRecord};
use event_schema::{decode_event, event_types, UserRegisteredEvent};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::repository::ProfileRepository;

pub struct AuthEventsHandler {
    profiles: Arc<dyn ProfileRepository>,
}

impl AuthEventsHandler {
    pub fn new(profiles: Arc<dyn ProfileRepository>) -> Self {
        Self { profiles }
    }
}

#[async_trait]
impl EventHandler for AuthEventsHandler {
    async fn handle(&self, record: &EventRecord) -> Result<()> {
        if let Some(event_type) = record.header("event_type") {
            if event_type != event_types::USER_REGISTERED {
                debug!(event_type, "Ignoring auth event type");
                return Ok(());
            }
        }

        let event = match decode_event::<UserRegisteredEvent>(&record.payload) {
            Ok(event) => event,
            Err(e) => {
                // retrying cannot fix a payload that does not parse
                error!(
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    error = %e,
                    "Skipping undecodable auth event"
                );
                return Ok(());
            }
        };

        self.profiles
            .insert_registered(event.account_id, &event.full_name)
            .await?;

        info!(
            account_id = %event.account_id,
            event_id = record.header("event_id").unwrap_or("-"),
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            "Projected registered account into profiles"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryProfileRepository;
    use event_bus::{publish_envelope, InMemoryBroker};
    use event_schema::topics;
    use uuid::Uuid;

    #[tokio::test]
    async fn duplicate_delivery_yields_one_profile() {
        let broker = InMemoryBroker::new(2);
        let repo = MemoryProfileRepository::default();
        let handler = AuthEventsHandler::new(Arc::new(repo.clone()));

        let account_id = Uuid::new_v4();
        let envelope = UserRegisteredEvent {
            account_id,
            full_name: "Alice".into(),
        }
        .envelope("auth-service");
        publish_envelope(&broker, topics::AUTH_USER_EVENT, account_id, &envelope)
            .await
            .unwrap();

        let record = broker.records(topics::AUTH_USER_EVENT).await.remove(0);
        handler.handle(&record).await.unwrap();
        handler.handle(&record).await.unwrap();

        assert_eq!(repo.profile_count().await, 1);
        let profile = repo.find_by_id(account_id).await.unwrap().unwrap();
        assert_eq!(profile.full_name, "Alice");
    }

    #[tokio::test]
    async fn garbage_payload_is_skipped() {
        let repo = MemoryProfileRepository::default();
        let handler = AuthEventsHandler::new(Arc::new(repo.clone()));
        let record = EventRecord {
            topic: topics::AUTH_USER_EVENT.into(),
            key: "k".into(),
            payload: b"not json".to_vec(),
            headers: Default::default(),
            partition: 0,
            offset: 7,
        };

        handler.handle(&record).await.unwrap();
        assert_eq!(repo.profile_count().await, 0);
    }
}
