//! In-process Agora cluster for end-to-end scenarios
//!
//! auth, profile and post services run on memory repositories and share one
//! [`InMemoryBroker`]. Nothing moves between services until [`TestCluster::settle`]
//! relays outboxes and drives the consumers, so tests control when events
//! land.

use auth_service::db::MemoryAccountRepository;
use auth_service::models::RegisterRequest;
use auth_service::{AuthResult, AuthService};
use crypto_core::{TokenService, TokenSettings};
use event_bus::{InMemoryBroker, MemoryConsumer};
use event_schema::topics;
use post_service::consumers::ProfileProjectionHandler;
use post_service::repository::MemoryPostRepository;
use post_service::{MediaService, PostService};
use profile_service::consumers::AuthEventsHandler;
use profile_service::repository::MemoryProfileRepository;
use profile_service::ProfileService;
use s3_utils::MemoryStorage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use transactional_outbox::{MemoryOutbox, OutboxConfig, OutboxProcessor};
use uuid::Uuid;

pub const TOKEN_SECRET: &[u8] = b"integration-test-secret-0123456789abcdef";
const PARTITIONS: u32 = 4;
const MAX_SETTLE_ROUNDS: usize = 32;

type Relay = OutboxProcessor<MemoryOutbox, InMemoryBroker>;

pub fn token_service() -> TokenService {
    TokenService::hs256(TOKEN_SECRET, TokenSettings::default())
}

pub struct TestCluster {
    pub broker: InMemoryBroker,
    pub storage: MemoryStorage,
    pub accounts: MemoryAccountRepository,
    pub profile_repo: MemoryProfileRepository,
    pub post_repo: MemoryPostRepository,
    pub auth: Arc<AuthService>,
    pub profiles: Arc<ProfileService>,
    pub posts: Arc<PostService>,
    pub media: Arc<MediaService>,
    auth_relay: Relay,
    profile_relay: Relay,
    profile_consumer: Mutex<MemoryConsumer>,
    post_consumer: Mutex<MemoryConsumer>,
    profile_handler: AuthEventsHandler,
    post_handler: ProfileProjectionHandler,
}

impl TestCluster {
    pub fn new() -> Self {
        let broker = InMemoryBroker::new(PARTITIONS);
        let storage = MemoryStorage::new();
        let ttl = Duration::from_secs(900);

        let auth_outbox = MemoryOutbox::new();
        let accounts = MemoryAccountRepository::new(auth_outbox.clone());
        let auth = Arc::new(AuthService::new(Arc::new(accounts.clone()), token_service()));

        let profile_outbox = MemoryOutbox::new();
        let profile_repo = MemoryProfileRepository::new(profile_outbox.clone());
        let profiles = Arc::new(ProfileService::new(
            Arc::new(profile_repo.clone()),
            Arc::new(storage.clone()),
            ttl,
        ));

        let post_repo = MemoryPostRepository::new();
        let posts = Arc::new(PostService::new(
            Arc::new(post_repo.clone()),
            Arc::new(storage.clone()),
            ttl,
        ));
        let media = Arc::new(MediaService::new(
            Arc::new(post_repo.clone()),
            Arc::new(storage.clone()),
            ttl,
        ));

        let publisher = Arc::new(broker.clone());
        let auth_relay = OutboxProcessor::new(Arc::new(auth_outbox), publisher.clone(), OutboxConfig::default());
        let profile_relay = OutboxProcessor::new(Arc::new(profile_outbox), publisher, OutboxConfig::default());

        let profile_consumer = broker.subscribe("profile-service", &[topics::AUTH_USER_EVENT]);
        let post_consumer = broker.subscribe(
            "post-service",
            &[topics::AUTH_USER_EVENT, topics::PROFILE_USER_EVENT],
        );

        Self {
            profile_handler: AuthEventsHandler::new(Arc::new(profile_repo.clone())),
            post_handler: ProfileProjectionHandler::new(Arc::new(post_repo.clone())),
            broker,
            storage,
            accounts,
            profile_repo,
            post_repo,
            auth,
            profiles,
            posts,
            media,
            auth_relay,
            profile_relay,
            profile_consumer: Mutex::new(profile_consumer),
            post_consumer: Mutex::new(post_consumer),
        }
    }

    /// Relays outboxes and drives consumers until a full round moves nothing.
    pub async fn settle(&self) {
        for round in 0..MAX_SETTLE_ROUNDS {
            let published = self.auth_relay.drain().await.unwrap_or(0)
                + self.profile_relay.drain().await.unwrap_or(0);
            let delivered = self
                .profile_consumer
                .lock()
                .await
                .drain(&self.profile_handler)
                .await
                .delivered
                + self
                    .post_consumer
                    .lock()
                    .await
                    .drain(&self.post_handler)
                    .await
                    .delivered;

            debug!(round, published, delivered, "settle round");
            if published == 0 && delivered == 0 {
                return;
            }
        }
    }

    /// Registers through auth-service; projections appear after [`Self::settle`].
    pub async fn register(&self, full_name: &str) -> AuthResult<Uuid> {
        let email = format!("{}@agora.test", Uuid::new_v4().simple());
        let (account, _) = self
            .auth
            .register(RegisterRequest {
                full_name: full_name.to_string(),
                email,
                password: "Str0ng!pass".to_string(),
            })
            .await?;
        Ok(account.id)
    }
}

impl Default for TestCluster {
    fn default() -> Self {
        Self::new()
    }
}
