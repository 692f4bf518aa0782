use async_trait::async_trait;
use chrono::Utc;
use error_types::{Result, ServiceError};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use transactional_outbox::{MemoryOutbox, OutboxEvent};
use uuid::Uuid;

use super::ProfileRepository;
use crate::domain::{FollowPlan, Relationship, RelationshipStatus, RelationshipType};
use crate::models::{PageRequest, Profile, ProfileSort, UpdateProfileRequest};

#[derive(Default)]
struct State {
    profiles: HashMap<Uuid, Profile>,
    edges: Vec<Relationship>,
}

/// In-memory profiles; one mutex makes every call a transaction.
#[derive(Clone, Default)]
pub struct MemoryProfileRepository {
    state: Arc<Mutex<State>>,
    outbox: MemoryOutbox,
}

impl MemoryProfileRepository {
    pub fn new(outbox: MemoryOutbox) -> Self {
        Self {
            state: Arc::default(),
            outbox,
        }
    }

    pub fn outbox(&self) -> &MemoryOutbox {
        &self.outbox
    }

    pub async fn profile_count(&self) -> usize {
        self.state.lock().await.profiles.len()
    }
}

fn compare(a: &Profile, b: &Profile, sort: ProfileSort) -> Ordering {
    match sort {
        ProfileSort::CreatedAt => a.created_at.cmp(&b.created_at),
        ProfileSort::FullName => a.full_name.cmp(&b.full_name),
        // NULLS LAST in either direction is handled by the caller
        ProfileSort::NickName => a.nick_name.cmp(&b.nick_name),
    }
}

#[async_trait]
impl ProfileRepository for MemoryProfileRepository {
    async fn insert_registered(&self, id: Uuid, full_name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .profiles
            .entry(id)
            .or_insert_with(|| Profile::registered(id, full_name.to_string()));
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Profile>> {
        Ok(self.state.lock().await.profiles.get(&id).cloned())
    }

    async fn list(&self, page: &PageRequest) -> Result<Vec<Profile>> {
        let state = self.state.lock().await;
        let mut profiles: Vec<Profile> = state.profiles.values().cloned().collect();
        profiles.sort_by(|a, b| {
            let nulls = match page.sort {
                ProfileSort::NickName => a.nick_name.is_none().cmp(&b.nick_name.is_none()),
                _ => Ordering::Equal,
            };
            let ordered = if page.ascending {
                compare(a, b, page.sort)
            } else {
                compare(b, a, page.sort)
            };
            nulls.then(ordered).then(a.id.cmp(&b.id))
        });

        Ok(profiles
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(page.size).unwrap_or(0))
            .collect())
    }

    async fn search(&self, name: &str, limit: i64) -> Result<Vec<Profile>> {
        let needle = name.to_lowercase();
        let state = self.state.lock().await;
        let mut matches: Vec<Profile> = state
            .profiles
            .values()
            .filter(|p| {
                p.full_name.to_lowercase().contains(&needle)
                    || p
                        .nick_name
                        .as_ref()
                        .is_some_and(|n| n.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.full_name.cmp(&b.full_name).then(a.id.cmp(&b.id)));
        matches.truncate(limit.max(0) as usize);
        Ok(matches)
    }

    async fn update_with_event(
        &self,
        update: &UpdateProfileRequest,
        event: &OutboxEvent,
    ) -> Result<Option<Profile>> {
        let mut state = self.state.lock().await;
        let Some(profile) = state.profiles.get_mut(&update.id) else {
            return Ok(None);
        };

        profile.nick_name = update.nick_name.clone();
        profile.full_name = update.full_name.clone();
        profile.address = update.address.clone();
        profile.bio = update.bio.clone();
        profile.phone_number = update.phone_number.clone();
        profile.profile_pic = update.profile_pic.clone();
        profile.updated_at = Utc::now();
        let updated = profile.clone();

        self.outbox.push(event.clone()).await;
        Ok(Some(updated))
    }

    async fn follow(&self, subject: Uuid, target: Uuid) -> Result<FollowPlan> {
        let mut state = self.state.lock().await;
        for id in [subject, target] {
            if !state.profiles.contains_key(&id) {
                return Err(ServiceError::not_found("Profile", id));
            }
        }

        let find = |edges: &[Relationship], from: Uuid, to: Uuid| {
            edges
                .iter()
                .find(|e| e.profile_id == from && e.target_profile_id == to)
                .cloned()
        };
        let forward = find(&state.edges, subject, target);
        let reverse = find(&state.edges, target, subject);
        let plan = FollowPlan::decide(subject, target, forward.as_ref(), reverse.as_ref());

        match &plan {
            FollowPlan::Follow(edge) => state.edges.push(edge.clone()),
            FollowPlan::BecomeFriends {
                upgrade_reverse,
                forward,
            } => {
                if let Some(edge) = state.edges.iter_mut().find(|e| e.id == *upgrade_reverse) {
                    edge.relationship_type = RelationshipType::Friend;
                    edge.status = RelationshipStatus::Accepted;
                }
                state.edges.push(forward.clone());
            }
            FollowPlan::Unchanged(_) => {}
        }

        Ok(plan)
    }

    async fn count_followings(&self, id: Uuid) -> Result<i64> {
        let state = self.state.lock().await;
        Ok(state.edges.iter().filter(|e| e.profile_id == id).count() as i64)
    }

    async fn friends(&self, id: Uuid) -> Result<Vec<Profile>> {
        let state = self.state.lock().await;
        Ok(state
            .edges
            .iter()
            .filter(|e| e.profile_id == id && e.is_friend())
            .filter_map(|e| state.profiles.get(&e.target_profile_id).cloned())
            .collect())
    }

    async fn edges_from(&self, id: Uuid) -> Result<Vec<Relationship>> {
        let state = self.state.lock().await;
        Ok(state.edges.iter().filter(|e| e.profile_id == id).cloned().collect())
    }

    async fn edges_to(&self, id: Uuid) -> Result<Vec<Relationship>> {
        let state = self.state.lock().await;
        Ok(state
            .edges
            .iter()
            .filter(|e| e.target_profile_id == id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded(names: &[&str]) -> (MemoryProfileRepository, Vec<Uuid>) {
        let repo = MemoryProfileRepository::default();
        let mut ids = Vec::new();
        for name in names {
            let id = Uuid::new_v4();
            repo.insert_registered(id, name).await.unwrap();
            ids.push(id);
        }
        (repo, ids)
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let repo = MemoryProfileRepository::default();
        let id = Uuid::new_v4();
        repo.insert_registered(id, "Alice").await.unwrap();
        repo.insert_registered(id, "Alice").await.unwrap();

        assert_eq!(repo.profile_count().await, 1);
        assert_eq!(repo.find_by_id(id).await.unwrap().unwrap().full_name, "Alice");
    }

    #[tokio::test]
    async fn one_way_follow_leaves_target_without_friends() {
        let (repo, ids) = seeded(&["A", "B"]).await;
        let (a, b) = (ids[0], ids[1]);

        repo.follow(a, b).await.unwrap();

        let out = repo.edges_from(a).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].relationship_type, RelationshipType::Following);
        assert_eq!(out[0].status, RelationshipStatus::Pending);
        assert!(repo.friends(b).await.unwrap().is_empty());
        assert!(repo
            .edges_to(b)
            .await
            .unwrap()
            .iter()
            .all(|e| !e.is_friend()));
    }

    #[tokio::test]
    async fn mutual_follow_makes_two_friend_rows() {
        let (repo, ids) = seeded(&["A", "B"]).await;
        let (a, b) = (ids[0], ids[1]);

        repo.follow(a, b).await.unwrap();
        repo.follow(b, a).await.unwrap();
        // a third call changes nothing
        repo.follow(a, b).await.unwrap();

        let ab = repo.edges_from(a).await.unwrap();
        let ba = repo.edges_from(b).await.unwrap();
        assert_eq!(ab.len(), 1);
        assert_eq!(ba.len(), 1);
        assert_ne!(ab[0].id, ba[0].id);
        for edge in ab.iter().chain(ba.iter()) {
            assert_eq!(edge.relationship_type, RelationshipType::Friend);
            assert_eq!(edge.status, RelationshipStatus::Accepted);
        }
        assert_eq!(repo.friends(a).await.unwrap()[0].id, b);
    }

    #[tokio::test]
    async fn follow_requires_both_profiles() {
        let (repo, ids) = seeded(&["A"]).await;
        let err = repo.follow(ids[0], Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
        assert!(repo.edges_from(ids[0]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_reciprocal_follows_converge() {
        let (repo, ids) = seeded(&["A", "B"]).await;
        let (a, b) = (ids[0], ids[1]);

        let (r1, r2) = tokio::join!(repo.follow(a, b), repo.follow(b, a));
        r1.unwrap();
        r2.unwrap();

        let all: Vec<Relationship> = [repo.edges_from(a).await.unwrap(), repo.edges_from(b).await.unwrap()].concat();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(Relationship::is_friend));
    }

    #[tokio::test]
    async fn search_matches_either_name_case_insensitively() {
        let (repo, ids) = seeded(&["Alice Liddell", "Bob Stone", "Carol"]).await;
        let update = UpdateProfileRequest {
            id: ids[2],
            nick_name: Some("ALIcat".into()),
            full_name: "Carol".into(),
            address: None,
            bio: None,
            phone_number: None,
            profile_pic: None,
        };
        let envelope = event_schema::ProfileUpdatedEvent {
            account_id: ids[2],
            nick_name: update.nick_name.clone(),
            full_name: update.full_name.clone(),
            profile_pic: None,
        }
        .envelope("profile-service");
        let event =
            OutboxEvent::from_envelope(event_schema::topics::PROFILE_USER_EVENT, ids[2], &envelope).unwrap();
        repo.update_with_event(&update, &event).await.unwrap();

        let names: Vec<String> = repo
            .search("ali", 50)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.full_name)
            .collect();
        assert_eq!(names, vec!["Alice Liddell".to_string(), "Carol".to_string()]);
        assert_eq!(repo.search("ali", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_pages_in_requested_order() {
        let (repo, _) = seeded(&["Cleo", "Abe", "Bea"]).await;
        let page = |page_no, ascending| PageRequest {
            page_no,
            size: 2,
            sort: ProfileSort::FullName,
            ascending,
        };

        let first: Vec<String> = repo.list(&page(0, true)).await.unwrap().into_iter().map(|p| p.full_name).collect();
        let second: Vec<String> = repo.list(&page(1, true)).await.unwrap().into_iter().map(|p| p.full_name).collect();
        assert_eq!(first, vec!["Abe", "Bea"]);
        assert_eq!(second, vec!["Cleo"]);

        let desc = repo.list(&page(0, false)).await.unwrap();
        assert_eq!(desc[0].full_name, "Cleo");
    }
}
