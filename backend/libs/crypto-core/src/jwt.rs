/// Access and refresh token issuing and validation for Agora services
///
/// Tokens are stateless: validation is a pure function of the key material,
/// the token bytes and the wall clock. No revocation list is consulted.
///
/// ## Algorithms
///
/// - **HS256**: shared secret (`JWT_SECRET`), used when no RSA keys are configured
/// - **RS256**: private key for the auth service, public key for verify-only
///   processes such as the gateway
///
/// ## Usage
///
/// ```rust,no_run
/// use crypto_core::jwt::{TokenKind, TokenService, TokenSettings};
/// use crypto_core::Principal;
/// use uuid::Uuid;
///
/// let tokens = TokenService::hs256(b"dev-secret", TokenSettings::from_secs(900, 604_800));
/// let principal = Principal::member(Uuid::new_v4());
/// let token = tokens.issue_access(&principal).unwrap();
/// assert_eq!(tokens.validate(&token, TokenKind::Access).unwrap(), principal);
/// ```
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use uuid::Uuid;

use crate::identity::{Principal, Role};

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_ACCESS_TTL_SECS: i64 = 900;
const DEFAULT_REFRESH_TTL_SECS: i64 = 604_800;

/// Cookie carrying the access token between browser, gateway and chat sockets
pub const ACCESS_TOKEN_COOKIE: &str = "AccessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "RefreshToken";

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    MalformedToken,

    #[error("token expired")]
    ExpiredToken,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token signing key not configured")]
    SigningUnavailable,

    #[error("failed to encode token: {0}")]
    Encoding(String),

    #[error("invalid token configuration: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, TokenError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// JWT claims. Access tokens carry the role; refresh tokens carry only `sub`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (account ID as UUID string)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Token type: "access" or "refresh"
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// Token lifetimes.
#[derive(Debug, Clone, Copy)]
pub struct TokenSettings {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl TokenSettings {
    pub fn from_secs(access_secs: i64, refresh_secs: i64) -> Self {
        Self {
            access_ttl: Duration::seconds(access_secs),
            refresh_ttl: Duration::seconds(refresh_secs),
        }
    }

    /// Reads `JWT_ACCESS_EXPIRATION` and `JWT_REFRESH_EXPIRATION` (seconds).
    pub fn from_env() -> Result<Self> {
        let access = env_secs("JWT_ACCESS_EXPIRATION", DEFAULT_ACCESS_TTL_SECS)?;
        let refresh = env_secs("JWT_REFRESH_EXPIRATION", DEFAULT_REFRESH_TTL_SECS)?;
        Ok(Self::from_secs(access, refresh))
    }
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self::from_secs(DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_SECS)
    }
}

fn env_secs(name: &str, default: i64) -> Result<i64> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or_else(|| TokenError::Configuration(format!("{name} must be a positive integer"))),
        Err(_) => Ok(default),
    }
}

// ============================================================================
// Token Service
// ============================================================================

/// Issues and validates signed tokens.
///
/// Keys are passed in at construction; there is no global key storage.
#[derive(Clone)]
pub struct TokenService {
    encoding: Option<EncodingKey>,
    decoding: DecodingKey,
    algorithm: Algorithm,
    settings: TokenSettings,
}

impl TokenService {
    /// Shared-secret signing and verification.
    pub fn hs256(secret: &[u8], settings: TokenSettings) -> Self {
        Self {
            encoding: Some(EncodingKey::from_secret(secret)),
            decoding: DecodingKey::from_secret(secret),
            algorithm: Algorithm::HS256,
            settings,
        }
    }

    /// RSA signing and verification from PEM-encoded keys.
    pub fn rs256(private_key_pem: &str, public_key_pem: &str, settings: TokenSettings) -> Result<Self> {
        let encoding = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| TokenError::Configuration(format!("invalid RSA private key: {e}")))?;
        let mut service = Self::rs256_verifier(public_key_pem, settings)?;
        service.encoding = Some(encoding);
        Ok(service)
    }

    /// Verify-only service. Issuing fails with [`TokenError::SigningUnavailable`].
    pub fn rs256_verifier(public_key_pem: &str, settings: TokenSettings) -> Result<Self> {
        let decoding = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| TokenError::Configuration(format!("invalid RSA public key: {e}")))?;
        Ok(Self {
            encoding: None,
            decoding,
            algorithm: Algorithm::RS256,
            settings,
        })
    }

    /// Picks RS256 when `JWT_PUBLIC_KEY_PEM` is set (signing additionally when
    /// `JWT_PRIVATE_KEY_PEM` is set), otherwise HS256 over `JWT_SECRET`.
    pub fn from_env() -> Result<Self> {
        let settings = TokenSettings::from_env()?;
        let private_pem = env::var("JWT_PRIVATE_KEY_PEM").ok().filter(|v| !v.is_empty());
        let public_pem = env::var("JWT_PUBLIC_KEY_PEM").ok().filter(|v| !v.is_empty());

        match (private_pem, public_pem) {
            (Some(private_pem), Some(public_pem)) => Self::rs256(&private_pem, &public_pem, settings),
            (None, Some(public_pem)) => Self::rs256_verifier(&public_pem, settings),
            (Some(_), None) => Err(TokenError::Configuration(
                "JWT_PRIVATE_KEY_PEM requires JWT_PUBLIC_KEY_PEM".to_string(),
            )),
            (None, None) => {
                let secret = env::var("JWT_SECRET").map_err(|_| {
                    TokenError::Configuration(
                        "JWT_SECRET or JWT_PUBLIC_KEY_PEM must be set".to_string(),
                    )
                })?;
                if secret.len() < 32 {
                    return Err(TokenError::Configuration(
                        "JWT_SECRET must be at least 32 bytes".to_string(),
                    ));
                }
                Ok(Self::hs256(secret.as_bytes(), settings))
            }
        }
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.settings.access_ttl.num_seconds()
    }

    pub fn refresh_ttl_secs(&self) -> i64 {
        self.settings.refresh_ttl.num_seconds()
    }

    // ------------------------------------------------------------------------
    // Token Generation
    // ------------------------------------------------------------------------

    /// Short-lived token embedding account id and role.
    pub fn issue_access(&self, principal: &Principal) -> Result<String> {
        self.sign(
            principal.account_id,
            TokenKind::Access,
            Some(principal.role),
            self.settings.access_ttl,
        )
    }

    /// Long-lived token embedding only the account id.
    pub fn issue_refresh(&self, account_id: Uuid) -> Result<String> {
        self.sign(account_id, TokenKind::Refresh, None, self.settings.refresh_ttl)
    }

    fn sign(&self, account_id: Uuid, kind: TokenKind, role: Option<Role>, ttl: Duration) -> Result<String> {
        let encoding_key = self.encoding.as_ref().ok_or(TokenError::SigningUnavailable)?;
        let now = Utc::now();
        let claims = Claims {
            sub: account_id.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            token_type: kind.as_str().to_string(),
            role,
        };

        encode(&Header::new(self.algorithm), &claims, encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    // ------------------------------------------------------------------------
    // Token Validation
    // ------------------------------------------------------------------------

    /// Validates a token of the expected kind and returns its principal.
    ///
    /// Expiry is checked before the signature, so an expired token yields
    /// `ExpiredToken` whether or not its signature verifies. Refresh tokens
    /// carry no role and come back with [`Role::default`].
    pub fn validate(&self, token: &str, kind: TokenKind) -> Result<Principal> {
        let unverified = self.peek_claims(token)?;
        if unverified.exp < Utc::now().timestamp() {
            return Err(TokenError::ExpiredToken);
        }

        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.validate_exp = true;

        let token_data = decode::<Claims>(token, &self.decoding, &validation).map_err(map_jwt_error)?;
        principal_from_claims(&token_data.claims, kind)
    }

    /// Account id of a valid refresh token.
    pub fn validate_refresh(&self, token: &str) -> Result<Uuid> {
        self.validate(token, TokenKind::Refresh)
            .map(|principal| principal.account_id)
    }

    /// Decodes claims without checking the signature. Only used to order the
    /// expiry check ahead of signature verification.
    fn peek_claims(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;

        decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map(|data| data.claims)
            .map_err(|_| TokenError::MalformedToken)
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::ExpiredToken,
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::InvalidSignature,
        _ => TokenError::MalformedToken,
    }
}

fn principal_from_claims(claims: &Claims, kind: TokenKind) -> Result<Principal> {
    if claims.token_type != kind.as_str() {
        return Err(TokenError::MalformedToken);
    }

    let account_id = Uuid::parse_str(&claims.sub).map_err(|_| TokenError::MalformedToken)?;
    let role = match kind {
        TokenKind::Access => claims.role.ok_or(TokenError::MalformedToken)?,
        TokenKind::Refresh => Role::default(),
    };

    Ok(Principal { account_id, role })
}

// ============================================================================
// Tests
// ============================================================================
