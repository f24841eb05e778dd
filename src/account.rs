//! Account manager: registration, credential checks, profile and avatar.

use std::sync::Arc;

use crate::asset::store::AssetStore;
use crate::asset::{Asset, AssetReference, AvatarNaming, Bucket, UploadedFile, validator};
use crate::crypto::PasswordHasher;
use crate::error::{Result, ServerError};
use crate::identity::{
    Identity, IdentityId, IdentityRepository, NewIdentity, ProfileChanges, Role,
};

/// Registration request, already validated by the HTTP layer.
#[derive(Clone)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub role: Role,
}

/// Avatar policy of an [`AccountManager`].
#[derive(Debug, Clone, Copy)]
pub struct AvatarPolicy {
    pub max_file_size: u64,
    pub naming: AvatarNaming,
}

#[derive(Clone)]
pub struct AccountManager {
    identities: Arc<dyn IdentityRepository>,
    hasher: Arc<dyn PasswordHasher>,
    assets: AssetStore,
    avatar: AvatarPolicy,
    allow_admin_registration: bool,
}

impl AccountManager {
    /// Create a new [`AccountManager`].
    pub fn new(
        identities: Arc<dyn IdentityRepository>,
        hasher: Arc<dyn PasswordHasher>,
        assets: AssetStore,
        avatar: AvatarPolicy,
        allow_admin_registration: bool,
    ) -> Self {
        Self {
            identities,
            hasher,
            assets,
            avatar,
            allow_admin_registration,
        }
    }

    /// Create an identity. Duplicate emails are refused.
    pub async fn register(&self, registration: Registration) -> Result<Identity> {
        if registration.role == Role::Administrator && !self.allow_admin_registration {
            tracing::warn!(email = %registration.email, "administrator self-registration refused");
            return Err(ServerError::Forbidden { resource: "role" });
        }

        if self
            .identities
            .find_by_email(&registration.email)
            .await?
            .is_some()
        {
            return Err(ServerError::EmailTaken(registration.email));
        }

        let password_hash = self.hasher.hash(&registration.password)?;
        let identity = self
            .identities
            .create(NewIdentity {
                email: registration.email,
                password_hash,
                first_name: registration.first_name,
                last_name: registration.last_name,
                phone: registration.phone,
                role: registration.role,
            })
            .await?;

        tracing::info!(user_id = %identity.id, role = %identity.role, "user registered");
        Ok(identity)
    }

    /// Resolve credentials to an identity.
    ///
    /// Unknown email and wrong password are indistinguishable.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Identity> {
        match self.identities.find_by_email(email).await? {
            Some(identity) if self.hasher.matches(password, &identity.password_hash) => {
                Ok(identity)
            },
            _ => {
                tracing::debug!(%email, "authentication failed");
                Err(ServerError::Unauthorized)
            },
        }
    }

    /// Current state of the caller's own record.
    pub async fn get_profile(&self, acting: &Identity) -> Result<Identity> {
        self.reload(acting.id).await
    }

    pub async fn update_profile(
        &self,
        acting: &Identity,
        changes: ProfileChanges,
    ) -> Result<Identity> {
        let identity = self.identities.update_profile(acting.id, changes).await?;

        tracing::info!(user_id = %identity.id, "profile updated");
        Ok(identity)
    }

    /// Set a new password once the current one is proven.
    pub async fn change_password(
        &self,
        acting: &Identity,
        current: &str,
        new: &str,
    ) -> Result<()> {
        let identity = self.reload(acting.id).await?;

        if !self.hasher.matches(current, &identity.password_hash) {
            tracing::warn!(user_id = %identity.id, "password change with wrong current password");
            return Err(ServerError::InvalidCurrentPassword);
        }

        let hash = self.hasher.hash(new)?;
        // Only replaces the hash `current` was checked against.
        if !self
            .identities
            .set_password_hash(identity.id, &identity.password_hash, &hash)
            .await?
        {
            return Err(self.lost_race(identity.id, "password").await);
        }

        tracing::info!(user_id = %identity.id, "password changed");
        Ok(())
    }

    /// Swap the caller's avatar.
    ///
    /// The previous file stays readable until the record points elsewhere.
    pub async fn replace_avatar(
        &self,
        acting: &Identity,
        image: Option<UploadedFile>,
    ) -> Result<Identity> {
        validator::validate(image.as_ref(), self.avatar.max_file_size)?;
        let image = image.unwrap_or_default();
        let identity = self.reload(acting.id).await?;
        let old = identity.avatar.clone();

        let staged = self
            .assets
            .stage(&image, Bucket::Avatars, self.avatar.naming.for_owner(identity.id))
            .await?;
        let reference = staged.reference().clone();

        if old.as_ref() == Some(&reference) {
            // Same name: confirm the record before the bytes are swapped.
            if let Err(err) = self.swap_avatar(identity.id, old.as_ref(), &reference).await {
                self.assets.discard(staged).await;
                return Err(err);
            }
            self.assets.commit(staged).await?;
        } else {
            self.assets.commit(staged).await?;
            if let Err(err) = self.swap_avatar(identity.id, old.as_ref(), &reference).await {
                self.drop_unreferenced(identity.id, &reference).await;
                return Err(err);
            }
            if let Some(old) = &old {
                self.assets.delete(old, Bucket::Avatars).await;
            }
        }

        tracing::info!(user_id = %identity.id, avatar = %reference, "avatar replaced");
        Ok(Identity {
            avatar: Some(reference),
            ..identity
        })
    }

    /// Bytes and content type of a stored avatar.
    pub async fn load_avatar(&self, reference: &str) -> Result<Asset> {
        self.assets.read(reference, Bucket::Avatars).await
    }

    async fn reload(&self, id: IdentityId) -> Result<Identity> {
        self.identities
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServerError::not_found(format!("user {id}")))
    }

    async fn swap_avatar(
        &self,
        id: IdentityId,
        expected: Option<&AssetReference>,
        new: &AssetReference,
    ) -> Result<()> {
        if self.identities.set_avatar(id, expected, new).await? {
            Ok(())
        } else {
            Err(self.lost_race(id, "avatar").await)
        }
    }

    /// Remove a freshly committed avatar that did not make it to the record.
    ///
    /// Owner-named files are shared by every request of that owner, so one
    /// is only removed once the record is known to point elsewhere.
    async fn drop_unreferenced(&self, id: IdentityId, reference: &AssetReference) {
        let unreferenced = match self.avatar.naming {
            AvatarNaming::Random => true,
            AvatarNaming::Owner => matches!(
                self.identities.find_by_id(id).await,
                Ok(Some(current)) if current.avatar.as_ref() != Some(reference)
            ),
        };

        if unreferenced {
            self.assets.delete(reference, Bucket::Avatars).await;
        } else {
            tracing::warn!(user_id = %id, avatar = %reference, "keeping avatar that may be referenced");
        }
    }

    /// Error for a conditional write that matched nothing.
    async fn lost_race(&self, id: IdentityId, resource: &'static str) -> ServerError {
        match self.reload(id).await {
            Ok(_) => {
                tracing::warn!(user_id = %id, resource, "account changed concurrently");
                ServerError::Conflict { resource }
            },
            Err(err) => err,
        }
    }
}
