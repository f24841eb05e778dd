//! Ad lifecycle.

use std::sync::Arc;

use crate::ad::{Ad, AdChanges, AdDetails, AdFields, AdId, AdRepository, NewAd};
use crate::asset::store::AssetStore;
use crate::asset::{Asset, Bucket, Naming, UploadedFile, validator};
use crate::error::{Result, ServerError};
use crate::guard;
use crate::identity::{Identity, IdentityRepository};

const RESOURCE: &str = "ad";

/// Orchestrates ad mutations together with their image.
#[derive(Clone)]
pub struct AdManager {
    ads: Arc<dyn AdRepository>,
    identities: Arc<dyn IdentityRepository>,
    assets: AssetStore,
    max_file_size: u64,
}

impl AdManager {
    /// Create a new [`AdManager`].
    pub fn new(
        ads: Arc<dyn AdRepository>,
        identities: Arc<dyn IdentityRepository>,
        assets: AssetStore,
        max_file_size: u64,
    ) -> Self {
        Self {
            ads,
            identities,
            assets,
            max_file_size,
        }
    }

    pub async fn list(&self) -> Result<Vec<Ad>> {
        self.ads.find_all().await
    }

    /// Ads owned by `acting`.
    pub async fn list_by_owner(&self, acting: &Identity) -> Result<Vec<Ad>> {
        self.ads.find_by_owner(acting.id).await
    }

    /// Ad with its owner's contact details.
    pub async fn get(&self, id: AdId) -> Result<AdDetails> {
        let ad = self.load(id).await?;
        let owner = self
            .identities
            .find_by_id(ad.owner)
            .await?
            .ok_or_else(|| ServerError::not_found(format!("owner of ad {id}")))?;

        Ok(AdDetails {
            ad,
            author_first_name: owner.first_name,
            author_last_name: owner.last_name,
            email: owner.email,
            phone: owner.phone,
        })
    }

    /// Create an ad owned by `acting`.
    ///
    /// Nothing is persisted unless the image is valid and written.
    pub async fn create(
        &self,
        acting: &Identity,
        fields: AdFields,
        image: Option<UploadedFile>,
    ) -> Result<Ad> {
        validator::validate(image.as_ref(), self.max_file_size)?;
        let image = image.unwrap_or_default();

        let reference = self
            .assets
            .save(&image, Bucket::AdImages, Naming::Random)
            .await?;

        let new_ad = NewAd {
            title: fields.title,
            description: fields.description,
            price: fields.price,
            image: Some(reference.clone()),
            owner: acting.id,
        };

        match self.ads.create(new_ad).await {
            Ok(ad) => {
                tracing::info!(ad_id = %ad.id, user_id = %acting.id, "ad created");
                Ok(ad)
            },
            Err(err) => {
                self.assets.delete(&reference, Bucket::AdImages).await;
                Err(err)
            },
        }
    }

    /// Merge `changes` into an existing ad.
    pub async fn update(
        &self,
        id: AdId,
        acting: &Identity,
        changes: AdChanges,
    ) -> Result<Ad> {
        let ad = self.load(id).await?;
        guard::ensure(ad.owner, acting, RESOURCE)?;

        let ad = self.ads.update_fields(id, changes).await?;

        tracing::info!(ad_id = %id, user_id = %acting.id, "ad updated");
        Ok(ad)
    }

    /// Delete an ad, its comments and its image.
    pub async fn delete(&self, id: AdId, acting: &Identity) -> Result<()> {
        let ad = self.load(id).await?;
        guard::ensure(ad.owner, acting, RESOURCE)?;

        self.ads.delete(id).await?;
        if let Some(image) = &ad.image {
            self.assets.delete(image, Bucket::AdImages).await;
        }

        tracing::info!(ad_id = %id, user_id = %acting.id, "ad deleted");
        Ok(())
    }

    /// Swap the ad image.
    ///
    /// The new reference is committed before the old file is removed. If
    /// another request moved the image first, the new file is dropped and
    /// the call fails with [`ServerError::Conflict`].
    pub async fn replace_image(
        &self,
        id: AdId,
        acting: &Identity,
        image: Option<UploadedFile>,
    ) -> Result<Ad> {
        let ad = self.load(id).await?;
        guard::ensure(ad.owner, acting, RESOURCE)?;
        validator::validate(image.as_ref(), self.max_file_size)?;
        let image = image.unwrap_or_default();

        let reference = self
            .assets
            .save(&image, Bucket::AdImages, Naming::Random)
            .await?;

        match self.ads.set_image(id, ad.image.as_ref(), &reference).await {
            Ok(true) => {},
            outcome => {
                self.assets.delete(&reference, Bucket::AdImages).await;
                return Err(match outcome {
                    Err(err) => err,
                    Ok(_) => self.lost_race(id).await,
                });
            },
        }

        if let Some(old) = ad.image.as_ref().filter(|old| **old != reference) {
            self.assets.delete(old, Bucket::AdImages).await;
        }

        tracing::info!(ad_id = %id, user_id = %acting.id, image = %reference, "ad image replaced");
        Ok(Ad {
            image: Some(reference),
            ..ad
        })
    }

    /// Bytes and content type of a stored ad image.
    pub async fn load_image(&self, reference: &str) -> Result<Asset> {
        self.assets.read(reference, Bucket::AdImages).await
    }

    async fn load(&self, id: AdId) -> Result<Ad> {
        self.ads
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServerError::not_found(format!("ad {id}")))
    }

    /// Error for a conditional image write that matched nothing.
    async fn lost_race(&self, id: AdId) -> ServerError {
        match self.load(id).await {
            Ok(_) => {
                tracing::warn!(ad_id = %id, "ad image changed concurrently");
                ServerError::Conflict { resource: RESOURCE }
            },
            Err(err) => err,
        }
    }
}
