//! Keeps the `profile_posts` projection current
//!
//! - `auth.user.event`: create the author or rename it
//! - `profile.user.event`: overwrite name, nickname and avatar key
//!
//! Both are upserts, so a redelivered record rewrites the same row.

use anyhow::Result;
use async_trait::async_trait;
use event_bus::{EventHandler, EventRecord};
use event_schema::{decode_event, topics, ProfileUpdatedEvent, UserRegisteredEvent};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::models::ProfilePost;
use crate::repository::PostRepository;

pub struct ProfileProjectionHandler {
    posts: Arc<dyn PostRepository>,
}

impl ProfileProjectionHandler {
    pub fn new(posts: Arc<dyn PostRepository>) -> Self {
        Self { posts }
    }
}

fn decode<T: DeserializeOwned>(record: &EventRecord) -> Option<T> {
    match decode_event::<T>(&record.payload) {
        Ok(event) => Some(event),
        Err(e) => {
            error!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                error = %e,
                "Skipping undecodable event"
            );
            None
        }
    }
}

#[async_trait]
impl EventHandler for ProfileProjectionHandler {
    async fn handle(&self, record: &EventRecord) -> Result<()> {
        let account_id = match record.topic.as_str() {
            topics::AUTH_USER_EVENT => {
                let Some(event) = decode::<UserRegisteredEvent>(record) else {
                    return Ok(());
                };
                self.posts
                    .insert_registered(event.account_id, &event.full_name)
                    .await?;
                event.account_id
            }
            topics::PROFILE_USER_EVENT => {
                let Some(event) = decode::<ProfileUpdatedEvent>(record) else {
                    return Ok(());
                };
                self.posts
                    .upsert_profile(&ProfilePost {
                        id: event.account_id,
                        full_name: event.full_name,
                        nick_name: event.nick_name,
                        profile_pic: event.profile_pic,
                    })
                    .await?;
                event.account_id
            }
            other => {
                warn!(topic = other, "Record from unexpected topic");
                return Ok(());
            }
        };

        info!(
            account_id = %account_id,
            event_id = record.header("event_id").unwrap_or("-"),
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            "Projected profile into posts"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryPostRepository;
    use event_bus::{publish_envelope, InMemoryBroker};
    use uuid::Uuid;

    async fn deliver_all(broker: &InMemoryBroker, handler: &ProfileProjectionHandler) {
        let mut records = broker.records(topics::AUTH_USER_EVENT).await;
        records.extend(broker.records(topics::PROFILE_USER_EVENT).await);
        for record in records {
            handler.handle(&record).await.unwrap();
        }
    }

    #[tokio::test]
    async fn profile_update_overwrites_registration() {
        let broker = InMemoryBroker::new(2);
        let repo = MemoryPostRepository::new();
        let handler = ProfileProjectionHandler::new(Arc::new(repo.clone()));
        let account_id = Uuid::new_v4();

        let registered = UserRegisteredEvent {
            account_id,
            full_name: "Alice".into(),
        }
        .envelope("auth-service");
        publish_envelope(&broker, topics::AUTH_USER_EVENT, account_id, &registered)
            .await
            .unwrap();
        let updated = ProfileUpdatedEvent {
            account_id,
            nick_name: Some("ally".into()),
            full_name: "Alice Liddell".into(),
            profile_pic: Some(format!("users/{account_id}/avatar/a.png")),
        }
        .envelope("profile-service");
        publish_envelope(&broker, topics::PROFILE_USER_EVENT, account_id, &updated)
            .await
            .unwrap();

        deliver_all(&broker, &handler).await;
        // redelivery of both
        deliver_all(&broker, &handler).await;

        assert_eq!(repo.profile_count().await, 1);
        let profile = repo.find_profile(account_id).await.unwrap().unwrap();
        assert_eq!(profile.full_name, "Alice Liddell");
        assert_eq!(profile.nick_name.as_deref(), Some("ally"));
    }

    #[tokio::test]
    async fn late_registration_keeps_the_newer_update() {
        let broker = InMemoryBroker::new(2);
        let repo = MemoryPostRepository::new();
        let handler = ProfileProjectionHandler::new(Arc::new(repo.clone()));
        let account_id = Uuid::new_v4();

        let updated = ProfileUpdatedEvent {
            account_id,
            nick_name: None,
            full_name: "Alicia".into(),
            profile_pic: None,
        }
        .envelope("profile-service");
        publish_envelope(&broker, topics::PROFILE_USER_EVENT, account_id, &updated)
            .await
            .unwrap();
        let registered = UserRegisteredEvent {
            account_id,
            full_name: "Alice".into(),
        }
        .envelope("auth-service");
        publish_envelope(&broker, topics::AUTH_USER_EVENT, account_id, &registered)
            .await
            .unwrap();

        for record in broker.records(topics::PROFILE_USER_EVENT).await {
            handler.handle(&record).await.unwrap();
        }
        for record in broker.records(topics::AUTH_USER_EVENT).await {
            handler.handle(&record).await.unwrap();
        }

        assert_eq!(
            repo.find_profile(account_id).await.unwrap().unwrap().full_name,
            "Alicia"
        );
    }

    #[tokio::test]
    async fn update_for_unknown_author_creates_it() {
        let repo = MemoryPostRepository::new();
        let handler = ProfileProjectionHandler::new(Arc::new(repo.clone()));
        let account_id = Uuid::new_v4();
        let record = EventRecord {
            topic: topics::PROFILE_USER_EVENT.into(),
            key: account_id.to_string(),
            payload: serde_json::to_vec(&ProfileUpdatedEvent {
                account_id,
                nick_name: None,
                full_name: "Bob".into(),
                profile_pic: None,
            })
            .unwrap(),
            headers: Default::default(),
            partition: 0,
            offset: 0,
        };

        handler.handle(&record).await.unwrap();
        assert_eq!(
            repo.find_profile(account_id).await.unwrap().unwrap().full_name,
            "Bob"
        );
    }

    #[tokio::test]
    async fn garbage_is_skipped() {
        let repo = MemoryPostRepository::new();
        let handler = ProfileProjectionHandler::new(Arc::new(repo.clone()));
        let record = EventRecord {
            topic: topics::AUTH_USER_EVENT.into(),
            key: "k".into(),
            payload: b"{".to_vec(),
            headers: Default::default(),
            partition: 1,
            offset: 3,
        };
        handler.handle(&record).await.unwrap();
        assert_eq!(repo.profile_count().await, 0);
    }
}
