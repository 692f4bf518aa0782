use async_trait::async_trait;
use error_types::{Result, ServiceError};
use sqlx::{postgres::PgRow, PgPool, Postgres, Row, Transaction};
use tracing::debug;
use transactional_outbox::{OutboxEvent, SqlxOutboxRepository};
use uuid::Uuid;

use super::ProfileRepository;
use crate::domain::relationship::pair_lock_key;
use crate::domain::{FollowPlan, Relationship, RelationshipStatus, RelationshipType};
use crate::models::{PageRequest, Profile, UpdateProfileRequest};

const PROFILE_COLUMNS: &str =
    "id, full_name, nick_name, address, bio, phone_number, profile_pic, created_at, updated_at";

const EDGE_COLUMNS: &str = "id, profile_id, target_profile_id, type, status, created_at";

/// PostgreSQL profiles and relationship edges
#[derive(Clone)]
pub struct PgProfileRepository {
    pool: PgPool,
    outbox: SqlxOutboxRepository,
}

impl PgProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        let outbox = SqlxOutboxRepository::new(pool.clone());
        Self { pool, outbox }
    }

    async fn edge_between(
        tx: &mut Transaction<'_, Postgres>,
        from: Uuid,
        to: Uuid,
    ) -> Result<Option<Relationship>> {
        let row = sqlx::query(&format!(
            "SELECT {EDGE_COLUMNS} FROM relationships WHERE profile_id = $1 AND target_profile_id = $2"
        ))
        .bind(from)
        .bind(to)
        .fetch_optional(&mut **tx)
        .await?;

        row.as_ref().map(edge_from_row).transpose()
    }

    async fn insert_edge(tx: &mut Transaction<'_, Postgres>, edge: &Relationship) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO relationships (id, profile_id, target_profile_id, type, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (profile_id, target_profile_id) DO NOTHING
            "#,
        )
        .bind(edge.id)
        .bind(edge.profile_id)
        .bind(edge.target_profile_id)
        .bind(edge.relationship_type.as_str())
        .bind(edge.status.as_str())
        .bind(edge.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

fn profile_from_row(row: &PgRow) -> Result<Profile> {
    Ok(Profile {
        id: row.try_get("id")?,
        full_name: row.try_get("full_name")?,
        nick_name: row.try_get("nick_name")?,
        address: row.try_get("address")?,
        bio: row.try_get("bio")?,
        phone_number: row.try_get("phone_number")?,
        profile_pic: row.try_get("profile_pic")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn edge_from_row(row: &PgRow) -> Result<Relationship> {
    let relationship_type: String = row.try_get("type")?;
    let status: String = row.try_get("status")?;
    Ok(Relationship {
        id: row.try_get("id")?,
        profile_id: row.try_get("profile_id")?,
        target_profile_id: row.try_get("target_profile_id")?,
        relationship_type: relationship_type
            .parse()
            .map_err(|e| ServiceError::Internal(anyhow::Error::new(e)))?,
        status: status
            .parse()
            .map_err(|e| ServiceError::Internal(anyhow::Error::new(e)))?,
        created_at: row.try_get("created_at")?,
    })
}

/// `%` and `_` in user input match literally.
fn like_pattern(name: &str) -> String {
    let escaped = name
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl ProfileRepository for PgProfileRepository {
    async fn insert_registered(&self, id: Uuid, full_name: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO profiles (id, full_name, created_at, updated_at)
            VALUES ($1, $2, NOW(), NOW())
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(full_name)
        .execute(&self.pool)
        .await?;

        debug!(profile_id = %id, "Registered profile ensured");
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Profile>> {
        let row = sqlx::query(&format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(profile_from_row).transpose()
    }

    async fn list(&self, page: &PageRequest) -> Result<Vec<Profile>> {
        // the column comes from the ProfileSort whitelist, never from input
        let direction = if page.ascending { "ASC" } else { "DESC" };
        let rows = sqlx::query(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY {} {direction} NULLS LAST, id LIMIT $1 OFFSET $2",
            page.sort.column()
        ))
        .bind(page.size)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(profile_from_row).collect()
    }

    async fn search(&self, name: &str, limit: i64) -> Result<Vec<Profile>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PROFILE_COLUMNS} FROM profiles
            WHERE full_name ILIKE $1 OR nick_name ILIKE $1
            ORDER BY full_name, id
            LIMIT $2
            "#
        ))
        .bind(like_pattern(name))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(profile_from_row).collect()
    }

    async fn update_with_event(
        &self,
        update: &UpdateProfileRequest,
        event: &OutboxEvent,
    ) -> Result<Option<Profile>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE profiles SET
                nick_name = $2,
                full_name = $3,
                address = $4,
                bio = $5,
                phone_number = $6,
                profile_pic = $7,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(update.id)
        .bind(&update.nick_name)
        .bind(&update.full_name)
        .bind(&update.address)
        .bind(&update.bio)
        .bind(&update.phone_number)
        .bind(&update.profile_pic)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let profile = profile_from_row(&row)?;

        self.outbox.insert(&mut tx, event).await?;
        tx.commit().await?;
        Ok(Some(profile))
    }

    async fn follow(&self, subject: Uuid, target: Uuid) -> Result<FollowPlan> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(pair_lock_key(subject, target))
            .execute(&mut *tx)
            .await?;

        let existing: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM profiles WHERE id = ANY($1)")
            .bind(vec![subject, target])
            .fetch_all(&mut *tx)
            .await?;
        for id in [subject, target] {
            if !existing.contains(&id) {
                return Err(ServiceError::not_found("Profile", id));
            }
        }

        let forward = Self::edge_between(&mut tx, subject, target).await?;
        let reverse = Self::edge_between(&mut tx, target, subject).await?;
        let plan = FollowPlan::decide(subject, target, forward.as_ref(), reverse.as_ref());

        match &plan {
            FollowPlan::Follow(edge) => Self::insert_edge(&mut tx, edge).await?,
            FollowPlan::BecomeFriends {
                upgrade_reverse,
                forward,
            } => {
                sqlx::query("UPDATE relationships SET type = $2, status = $3 WHERE id = $1")
                    .bind(upgrade_reverse)
                    .bind(RelationshipType::Friend.as_str())
                    .bind(RelationshipStatus::Accepted.as_str())
                    .execute(&mut *tx)
                    .await?;
                Self::insert_edge(&mut tx, forward).await?;
            }
            FollowPlan::Unchanged(_) => {}
        }

        tx.commit().await?;
        Ok(plan)
    }

    async fn count_followings(&self, id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM relationships WHERE profile_id = $1 AND type IN ('FOLLOWING', 'FRIEND')",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn friends(&self, id: Uuid) -> Result<Vec<Profile>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.full_name, p.nick_name, p.address, p.bio, p.phone_number,
                   p.profile_pic, p.created_at, p.updated_at
            FROM relationships r
            JOIN profiles p ON p.id = r.target_profile_id
            WHERE r.profile_id = $1 AND r.type = 'FRIEND'
            ORDER BY r.created_at
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(profile_from_row).collect()
    }

    async fn edges_from(&self, id: Uuid) -> Result<Vec<Relationship>> {
        let rows = sqlx::query(&format!(
            "SELECT {EDGE_COLUMNS} FROM relationships WHERE profile_id = $1 ORDER BY created_at"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(edge_from_row).collect()
    }

    async fn edges_to(&self, id: Uuid) -> Result<Vec<Relationship>> {
        let rows = sqlx::query(&format!(
            "SELECT {EDGE_COLUMNS} FROM relationships WHERE target_profile_id = $1 ORDER BY created_at"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(edge_from_row).collect()
    }
}
