use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    Following,
    Friend,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Following => "FOLLOWING",
            RelationshipType::Friend => "FRIEND",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipStatus {
    Pending,
    Accepted,
}

impl RelationshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipStatus::Pending => "PENDING",
            RelationshipStatus::Accepted => "ACCEPTED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown relationship value: {0}")]
pub struct UnknownVariant(pub String);

impl FromStr for RelationshipType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FOLLOWING" => Ok(RelationshipType::Following),
            "FRIEND" => Ok(RelationshipType::Friend),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl FromStr for RelationshipStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RelationshipStatus::Pending),
            "ACCEPTED" => Ok(RelationshipStatus::Accepted),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Directed edge `profile_id -> target_profile_id`.
///
/// A friendship is two rows, one per direction; they are never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub target_profile_id: Uuid,
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    pub status: RelationshipStatus,
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    pub fn new(
        profile_id: Uuid,
        target_profile_id: Uuid,
        relationship_type: RelationshipType,
        status: RelationshipStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            profile_id,
            target_profile_id,
            relationship_type,
            status,
            created_at: Utc::now(),
        }
    }

    pub fn following(profile_id: Uuid, target_profile_id: Uuid) -> Self {
        Self::new(
            profile_id,
            target_profile_id,
            RelationshipType::Following,
            RelationshipStatus::Pending,
        )
    }

    pub fn friend(profile_id: Uuid, target_profile_id: Uuid) -> Self {
        Self::new(
            profile_id,
            target_profile_id,
            RelationshipType::Friend,
            RelationshipStatus::Accepted,
        )
    }

    pub fn is_friend(&self) -> bool {
        self.relationship_type == RelationshipType::Friend
    }
}

/// What a `follow(subject, target)` call has to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowPlan {
    /// No edge either way: one-way intent
    Follow(Relationship),
    /// Target already follows subject: upgrade that edge and add ours, both FRIEND/ACCEPTED
    BecomeFriends {
        upgrade_reverse: Uuid,
        forward: Relationship,
    },
    /// subject -> target already exists; nothing is written
    Unchanged(Relationship),
}

impl FollowPlan {
    /// `forward` is the existing subject -> target edge, `reverse` the
    /// existing target -> subject edge.
    pub fn decide(
        subject: Uuid,
        target: Uuid,
        forward: Option<&Relationship>,
        reverse: Option<&Relationship>,
    ) -> Self {
        if let Some(existing) = forward {
            return FollowPlan::Unchanged(existing.clone());
        }

        match reverse {
            Some(reverse) => FollowPlan::BecomeFriends {
                upgrade_reverse: reverse.id,
                forward: Relationship::friend(subject, target),
            },
            None => FollowPlan::Follow(Relationship::following(subject, target)),
        }
    }

    /// Edge that subject -> target ends up as.
    pub fn forward(&self) -> &Relationship {
        match self {
            FollowPlan::Follow(edge)
            | FollowPlan::BecomeFriends { forward: edge, .. }
            | FollowPlan::Unchanged(edge) => edge,
        }
    }
}

/// Advisory-lock key shared by both directions of a pair.
pub fn pair_lock_key(a: Uuid, b: Uuid) -> i64 {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    let mixed = low.as_u128() ^ high.as_u128().rotate_left(64);
    ((mixed >> 64) as u64 ^ mixed as u64) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_follow_is_pending() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let plan = FollowPlan::decide(a, b, None, None);

        let edge = plan.forward();
        assert!(matches!(plan, FollowPlan::Follow(_)));
        assert_eq!((edge.profile_id, edge.target_profile_id), (a, b));
        assert_eq!(edge.relationship_type, RelationshipType::Following);
        assert_eq!(edge.status, RelationshipStatus::Pending);
    }

    #[test]
    fn reciprocal_follow_upgrades_both_directions() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let reverse = Relationship::following(b, a);

        match FollowPlan::decide(a, b, None, Some(&reverse)) {
            FollowPlan::BecomeFriends {
                upgrade_reverse,
                forward,
            } => {
                assert_eq!(upgrade_reverse, reverse.id);
                assert_eq!((forward.profile_id, forward.target_profile_id), (a, b));
                assert!(forward.is_friend());
                assert_eq!(forward.status, RelationshipStatus::Accepted);
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn repeated_follow_writes_nothing() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let forward = Relationship::friend(a, b);
        let reverse = Relationship::friend(b, a);

        let plan = FollowPlan::decide(a, b, Some(&forward), Some(&reverse));
        assert_eq!(plan, FollowPlan::Unchanged(forward));
    }

    #[test]
    fn lock_key_ignores_direction() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(pair_lock_key(a, b), pair_lock_key(b, a));
        assert_ne!(pair_lock_key(a, b), pair_lock_key(a, Uuid::new_v4()));
    }

    #[test]
    fn wire_names_are_upper_case() {
        let edge = Relationship::following(Uuid::new_v4(), Uuid::new_v4());
        let value = serde_json::to_value(&edge).unwrap();
        assert_eq!(value["type"], "FOLLOWING");
        assert_eq!(value["status"], "PENDING");
        assert!(value.get("targetProfileId").is_some());
        assert_eq!("FRIEND".parse::<RelationshipType>().unwrap(), RelationshipType::Friend);
        assert!("friend".parse::<RelationshipType>().is_err());
    }

    #[test]
    fn unknown_variant_reports_the_value() {
        let err = "REJECTED".parse::<RelationshipStatus>().unwrap_err();
        assert_eq!(err, UnknownVariant("REJECTED".into()));
        let err: anyhow::Error = err.into();
        assert_eq!(err.to_string(), "unknown relationship value: REJECTED");
    }
}
