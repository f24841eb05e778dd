//! Classified ads.

pub mod service;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use service::AdManager;

use crate::asset::AssetReference;
use crate::error::Result;
use crate::identity::IdentityId;

/// Highest accepted price.
pub const MAX_PRICE: i32 = 10_000_000;

/// Primary key of an [`Ad`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AdId(pub i32);

impl fmt::Display for AdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ad as saved on the record store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ad {
    pub id: AdId,
    pub title: String,
    pub description: String,
    pub price: i32,
    pub image: Option<AssetReference>,
    /// Set once at creation.
    pub owner: IdentityId,
}

impl Ad {
    /// Merge the provided fields, leaving the others untouched.
    pub fn apply(&mut self, changes: AdChanges) {
        if let Some(title) = changes.title {
            self.title = title;
        }
        if let Some(description) = changes.description {
            self.description = description;
        }
        if let Some(price) = changes.price {
            self.price = price;
        }
    }
}

/// Ad not yet persisted.
#[derive(Debug, Clone)]
pub struct NewAd {
    pub title: String,
    pub description: String,
    pub price: i32,
    pub image: Option<AssetReference>,
    pub owner: IdentityId,
}

/// Textual fields of an ad, as given on creation.
#[derive(Debug, Clone)]
pub struct AdFields {
    pub title: String,
    pub description: String,
    pub price: i32,
}

/// Partial update of an ad.
#[derive(Debug, Clone, Default)]
pub struct AdChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<i32>,
}

/// Ad joined with its owner's contact details.
#[derive(Debug, Clone)]
pub struct AdDetails {
    pub ad: Ad,
    pub author_first_name: String,
    pub author_last_name: String,
    pub email: String,
    pub phone: String,
}

/// Port for ad persistence.
#[async_trait::async_trait]
pub trait AdRepository: Send + Sync {
    async fn find_by_id(&self, id: AdId) -> Result<Option<Ad>>;
    /// Every ad, oldest first.
    async fn find_all(&self) -> Result<Vec<Ad>>;
    async fn find_by_owner(&self, owner: IdentityId) -> Result<Vec<Ad>>;
    async fn create(&self, ad: NewAd) -> Result<Ad>;
    /// Write title, description and price. The image is never touched.
    async fn update_fields(&self, id: AdId, changes: AdChanges) -> Result<Ad>;
    /// Point the ad at `new` only while it still refers to `expected`.
    ///
    /// Returns `false` when nothing was written, either because the image
    /// moved on or because the ad is gone.
    async fn set_image(
        &self,
        id: AdId,
        expected: Option<&AssetReference>,
        new: &AssetReference,
    ) -> Result<bool>;
    /// Remove the ad together with its comments.
    async fn delete(&self, id: AdId) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_merges_present_fields() {
        let mut ad = Ad {
            id: AdId(1),
            title: "Laptop for sale".into(),
            description: "Barely used laptop".into(),
            price: 15_000,
            image: None,
            owner: IdentityId(1),
        };

        ad.apply(AdChanges {
            price: Some(12_000),
            ..Default::default()
        });

        assert_eq!(ad.price, 12_000);
        assert_eq!(ad.title, "Laptop for sale");
        assert_eq!(ad.description, "Barely used laptop");
        assert_eq!(ad.owner, IdentityId(1));
    }
}
