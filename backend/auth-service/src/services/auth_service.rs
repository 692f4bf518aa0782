/// Registration, login and refresh
use crypto_core::{Principal, TokenService};
use event_schema::{topics, UserRegisteredEvent};
use std::sync::Arc;
use tracing::{info, warn};
use transactional_outbox::OutboxEvent;
use validator::Validate;

use crate::db::AccountRepository;
use crate::error::{AuthError, AuthResult};
use crate::models::{normalize_email, Account, LoginRequest, RegisterRequest};
use crate::security::{hash_password, verify_password};

pub const SERVICE_NAME: &str = "auth-service";

/// Token pair for a freshly authenticated account
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct AuthService {
    accounts: Arc<dyn AccountRepository>,
    tokens: TokenService,
}

impl AuthService {
    pub fn new(accounts: Arc<dyn AccountRepository>, tokens: TokenService) -> Self {
        Self { accounts, tokens }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub async fn register(&self, req: RegisterRequest) -> AuthResult<(Account, IssuedTokens)> {
        req.validate()?;

        let email = normalize_email(&req.email);
        if self.accounts.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailAlreadyExists);
        }

        let password_hash = hash_password(&req.password)?;
        let account = Account::new(req.full_name.trim().to_string(), email, password_hash);

        let envelope = UserRegisteredEvent {
            account_id: account.id,
            full_name: account.full_name.clone(),
        }
        .envelope(SERVICE_NAME);
        let event = OutboxEvent::from_envelope(topics::AUTH_USER_EVENT, account.id, &envelope)?;

        self.accounts.create_with_event(&account, &event).await?;
        info!(account_id = %account.id, event_id = %event.id, "Account registered");

        let tokens = self.issue(&account)?;
        Ok((account, tokens))
    }

    pub async fn login(&self, req: LoginRequest) -> AuthResult<(Account, IssuedTokens)> {
        let email = normalize_email(&req.email);
        let account = match self.accounts.find_by_email(&email).await? {
            Some(account) => account,
            None => {
                warn!("Login attempt for unknown account");
                return Err(AuthError::InvalidCredentials);
            }
        };

        verify_password(&req.password, &account.password_hash).map_err(|e| {
            if matches!(e, AuthError::InvalidCredentials) {
                warn!(account_id = %account.id, "Login with wrong password");
            }
            e
        })?;

        let tokens = self.issue(&account)?;
        Ok((account, tokens))
    }

    /// Validates a refresh token, reloads the current role and rotates both tokens.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<(Account, IssuedTokens)> {
        let account_id = self.tokens.validate_refresh(refresh_token)?;
        let account = self
            .accounts
            .find_by_id(account_id)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let tokens = self.issue(&account)?;
        Ok((account, tokens))
    }

    fn issue(&self, account: &Account) -> AuthResult<IssuedTokens> {
        let principal = Principal::new(account.id, account.role);
        Ok(IssuedTokens {
            access_token: self.tokens.issue_access(&principal)?,
            refresh_token: self.tokens.issue_refresh(account.id)?,
        })
    }
}
