//! Shared fixtures for unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use tokio::sync::Notify;

use crate::account::{AccountManager, AvatarPolicy};
use crate::ad::{Ad, AdChanges, AdFields, AdId, AdManager, AdRepository, NewAd};
use crate::asset::AssetReference;
use crate::asset::store::AssetStore;
use crate::asset::store::tests::jpeg;
use crate::asset::validator::DEFAULT_MAX_FILE_SIZE;
use crate::asset::{AvatarNaming, Bucket};
use crate::clock::FixedClock;
use crate::comment::CommentManager;
use crate::config::Configuration;
use crate::crypto::PasswordHasher;
use crate::crypto::tests::fast_manager;
use crate::database::Repositories;
use crate::database::memory::MemoryStore;
use crate::error::{Result, ServerError};
use crate::identity::{
    Identity, IdentityId, IdentityRepository, NewIdentity, ProfileChanges, Role,
};
use crate::telemetry::detached_metrics_handle;
use crate::AppState;

/// Instant returned by the fixture clock.
pub fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

/// Password of every identity created by [`Fixture::identity`].
pub const PASSWORD: &str = "password123";

/// Managers wired to an in-memory store and temporary buckets.
pub struct Fixture {
    _root: TempDir,
    avatar_naming: AvatarNaming,
    pub store: Arc<MemoryStore>,
    pub assets: AssetStore,
    pub hasher: Arc<dyn PasswordHasher>,
    pub ads: AdManager,
    pub comments: CommentManager,
    pub accounts: AccountManager,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_avatar_naming(AvatarNaming::Random).await
    }

    pub async fn with_avatar_naming(naming: AvatarNaming) -> Self {
        let root = tempfile::tempdir().unwrap();
        let assets = crate::asset::store::tests::store(root.path());
        assets.init().await;

        let store = Arc::new(MemoryStore::default());
        let hasher: Arc<dyn PasswordHasher> = Arc::new(fast_manager());
        let clock = Arc::new(FixedClock(noon()));

        let ads = AdManager::new(
            store.clone(),
            store.clone(),
            assets.clone(),
            DEFAULT_MAX_FILE_SIZE,
        );
        let comments =
            CommentManager::new(store.clone(), store.clone(), store.clone(), clock);
        let accounts = AccountManager::new(
            store.clone(),
            Arc::clone(&hasher),
            assets.clone(),
            AvatarPolicy {
                max_file_size: DEFAULT_MAX_FILE_SIZE,
                naming,
            },
            false,
        );

        Self {
            _root: root,
            avatar_naming: naming,
            store,
            assets,
            hasher,
            ads,
            comments,
            accounts,
        }
    }

    /// Application state sharing this fixture's store and buckets.
    pub fn state(&self) -> AppState {
        let mut config = Configuration::default();
        config.storage.avatar_dir = self.assets.directory(Bucket::Avatars).to_path_buf();
        config.storage.ad_image_dir = self.assets.directory(Bucket::AdImages).to_path_buf();
        config.storage.avatar_naming = self.avatar_naming;

        AppState::new(
            Arc::new(config),
            Repositories::in_memory(Arc::clone(&self.store)),
            Arc::clone(&self.hasher),
            self.assets.clone(),
            Arc::new(FixedClock(noon())),
            detached_metrics_handle().unwrap(),
        )
    }

    /// Router over [`Fixture::state`].
    pub fn app(&self) -> Router {
        crate::app(self.state())
    }

    /// Persist an identity whose password is [`PASSWORD`].
    pub async fn identity(&self, email: &str, role: Role) -> Identity {
        IdentityRepository::create(
            self.store.as_ref(),
            NewIdentity {
                email: email.into(),
                password_hash: self.hasher.hash(PASSWORD).unwrap(),
                first_name: "Ivan".into(),
                last_name: "Petrov".into(),
                phone: "+7 (900) 123-45-67".into(),
                role,
            },
        )
        .await
        .unwrap()
    }

    /// Persist an ad with a JPEG image.
    pub async fn ad(&self, owner: &Identity) -> Ad {
        let fields = AdFields {
            title: "Laptop for sale".into(),
            description: "Barely used, with charger".into(),
            price: 15_000,
        };
        self.ads.create(owner, fields, Some(jpeg())).await.unwrap()
    }

    /// Ad manager sharing this fixture's identities over other ports.
    pub fn ad_manager(&self, ads: Arc<dyn AdRepository>, assets: AssetStore) -> AdManager {
        AdManager::new(ads, self.store.clone(), assets, DEFAULT_MAX_FILE_SIZE)
    }

    /// Account manager with this fixture's hasher over other ports.
    pub fn account_manager(
        &self,
        identities: Arc<dyn IdentityRepository>,
        assets: AssetStore,
    ) -> AccountManager {
        AccountManager::new(
            identities,
            Arc::clone(&self.hasher),
            assets,
            AvatarPolicy {
                max_file_size: DEFAULT_MAX_FILE_SIZE,
                naming: self.avatar_naming,
            },
            false,
        )
    }

    /// This fixture's store wrapped so that `call` runs `hook` first.
    pub fn hooked(&self, call: Call, hook: Hook) -> Arc<HookedStore> {
        Arc::new(HookedStore {
            inner: Arc::clone(&self.store),
            call,
            hook,
        })
    }

    /// Asset store whose `bucket` directory is a regular file.
    pub fn unwritable(&self, bucket: Bucket) -> AssetStore {
        let blocker = self
            .assets
            .directory(bucket)
            .with_file_name(format!("{bucket}-blocker"));
        std::fs::write(&blocker, b"not a directory").unwrap();

        match bucket {
            Bucket::Avatars => {
                AssetStore::new(blocker, self.assets.directory(Bucket::AdImages))
            },
            Bucket::AdImages => {
                AssetStore::new(self.assets.directory(Bucket::Avatars), blocker)
            },
        }
    }

    /// Number of files currently in `bucket`.
    pub fn files(&self, bucket: Bucket) -> usize {
        std::fs::read_dir(self.assets.directory(bucket))
            .map(|dir| dir.count())
            .unwrap_or(0)
    }
}

/// Holds a task inside a repository call until released.
#[derive(Default)]
pub struct Gate {
    entered: Notify,
    resume: Notify,
}

impl Gate {
    async fn pass(&self) {
        self.entered.notify_one();
        self.resume.notified().await;
    }

    /// Wait until a task is held.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.resume.notify_one();
    }
}

/// Repository writes a [`HookedStore`] can intercept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    CreateAd,
    UpdateFields,
    SetImage,
    UpdateProfile,
    SetPasswordHash,
    SetAvatar,
}

/// What happens on an intercepted call.
pub enum Hook {
    Pause(Arc<Gate>),
    Fail,
}

/// [`MemoryStore`] with one write paused or failing.
pub struct HookedStore {
    inner: Arc<MemoryStore>,
    call: Call,
    hook: Hook,
}

impl HookedStore {
    async fn intercept(&self, call: Call) -> Result<()> {
        if call != self.call {
            return Ok(());
        }

        match &self.hook {
            Hook::Pause(gate) => {
                gate.pass().await;
                Ok(())
            },
            Hook::Fail => Err(ServerError::Internal {
                details: "record store unavailable".into(),
                source: None,
            }),
        }
    }
}

#[async_trait]
impl AdRepository for HookedStore {
    async fn find_by_id(&self, id: AdId) -> Result<Option<Ad>> {
        AdRepository::find_by_id(self.inner.as_ref(), id).await
    }

    async fn find_all(&self) -> Result<Vec<Ad>> {
        self.inner.find_all().await
    }

    async fn find_by_owner(&self, owner: IdentityId) -> Result<Vec<Ad>> {
        self.inner.find_by_owner(owner).await
    }

    async fn create(&self, ad: NewAd) -> Result<Ad> {
        self.intercept(Call::CreateAd).await?;
        AdRepository::create(self.inner.as_ref(), ad).await
    }

    async fn update_fields(&self, id: AdId, changes: AdChanges) -> Result<Ad> {
        self.intercept(Call::UpdateFields).await?;
        self.inner.update_fields(id, changes).await
    }

    async fn set_image(
        &self,
        id: AdId,
        expected: Option<&AssetReference>,
        new: &AssetReference,
    ) -> Result<bool> {
        self.intercept(Call::SetImage).await?;
        self.inner.set_image(id, expected, new).await
    }

    async fn delete(&self, id: AdId) -> Result<()> {
        AdRepository::delete(self.inner.as_ref(), id).await
    }
}

#[async_trait]
impl IdentityRepository for HookedStore {
    async fn find_by_id(&self, id: IdentityId) -> Result<Option<Identity>> {
        IdentityRepository::find_by_id(self.inner.as_ref(), id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>> {
        self.inner.find_by_email(email).await
    }

    async fn create(&self, identity: NewIdentity) -> Result<Identity> {
        IdentityRepository::create(self.inner.as_ref(), identity).await
    }

    async fn update_profile(
        &self,
        id: IdentityId,
        changes: ProfileChanges,
    ) -> Result<Identity> {
        self.intercept(Call::UpdateProfile).await?;
        self.inner.update_profile(id, changes).await
    }

    async fn set_password_hash(
        &self,
        id: IdentityId,
        expected: &str,
        new: &str,
    ) -> Result<bool> {
        self.intercept(Call::SetPasswordHash).await?;
        self.inner.set_password_hash(id, expected, new).await
    }

    async fn set_avatar(
        &self,
        id: IdentityId,
        expected: Option<&AssetReference>,
        new: &AssetReference,
    ) -> Result<bool> {
        self.intercept(Call::SetAvatar).await?;
        self.inner.set_avatar(id, expected, new).await
    }
}

/// Boundary of bodies built by [`multipart`].
pub const BOUNDARY: &str = "adboard-test-boundary";

/// `Content-Type` header matching [`BOUNDARY`].
pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

/// One part of a `multipart/form-data` body.
pub struct Part<'a> {
    pub name: &'a str,
    pub file_name: Option<&'a str>,
    pub content_type: &'a str,
    pub bytes: &'a [u8],
}

/// Encode `parts` as a `multipart/form-data` body.
pub fn multipart(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();

    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let disposition = match part.file_name {
            Some(file_name) => format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{file_name}\"\r\n",
                part.name
            ),
            None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.name),
        };
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", part.content_type).as_bytes());
        body.extend_from_slice(part.bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    body
}

/// Collect a response body.
pub async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    use http_body_util::BodyExt;

    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

/// Collect a response body as JSON.
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
