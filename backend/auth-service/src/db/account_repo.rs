use async_trait::async_trait;
use crypto_core::Role;
use sqlx::{postgres::PgRow, PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use transactional_outbox::{MemoryOutbox, OutboxEvent, SqlxOutboxRepository};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::models::Account;

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Inserts the account and its registration event atomically.
    /// A taken email fails with `EmailAlreadyExists`.
    async fn create_with_event(&self, account: &Account, event: &OutboxEvent) -> AuthResult<()>;

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<Account>>;

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<Account>>;
}

#[derive(Clone)]
pub struct PgAccountRepository {
    pool: PgPool,
    outbox: SqlxOutboxRepository,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        let outbox = SqlxOutboxRepository::new(pool.clone());
        Self { pool, outbox }
    }
}

fn account_from_row(row: &PgRow) -> AuthResult<Account> {
    let role: String = row.try_get("role")?;
    Ok(Account {
        id: row.try_get("id")?,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: role
            .parse::<Role>()
            .map_err(|e| AuthError::Database(format!("corrupt role column: {e}")))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn create_with_event(&self, account: &Account, event: &OutboxEvent) -> AuthResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO accounts (id, full_name, email, password_hash, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(account.id)
        .bind(&account.full_name)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.role.as_str())
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => AuthError::EmailAlreadyExists,
            _ => AuthError::Database(e.to_string()),
        })?;

        self.outbox.insert(&mut tx, event).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, full_name, email, password_hash, role, created_at, updated_at
            FROM accounts WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, full_name, email, password_hash, role, created_at, updated_at
            FROM accounts WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(account_from_row).transpose()
    }
}

/// In-memory accounts sharing an outbox with the relay.
#[derive(Clone, Default)]
pub struct MemoryAccountRepository {
    accounts: Arc<RwLock<HashMap<Uuid, Account>>>,
    outbox: MemoryOutbox,
}

impl MemoryAccountRepository {
    pub fn new(outbox: MemoryOutbox) -> Self {
        Self {
            accounts: Arc::default(),
            outbox,
        }
    }

    pub fn outbox(&self) -> &MemoryOutbox {
        &self.outbox
    }

    pub async fn set_role(&self, id: Uuid, role: Role) {
        if let Some(account) = self.accounts.write().await.get_mut(&id) {
            account.role = role;
        }
    }

    pub async fn remove(&self, id: Uuid) {
        self.accounts.write().await.remove(&id);
    }
}

#[async_trait]
impl AccountRepository for MemoryAccountRepository {
    async fn create_with_event(&self, account: &Account, event: &OutboxEvent) -> AuthResult<()> {
        // the write lock spans both writes so they become visible together
        let mut accounts = self.accounts.write().await;
        if accounts.values().any(|a| a.email == account.email) {
            return Err(AuthError::EmailAlreadyExists);
        }
        accounts.insert(account.id, account.clone());
        self.outbox.push(event.clone()).await;
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().find(|a| a.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<Account>> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }
}
