//! In-process record store.
//!
//! Used when no PostgreSQL instance is configured, and as the test double
//! of every repository port.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::ad::{Ad, AdChanges, AdId, AdRepository, NewAd};
use crate::asset::AssetReference;
use crate::comment::{Comment, CommentId, CommentRepository, NewComment};
use crate::error::{Result, ServerError};
use crate::identity::{
    Identity, IdentityId, IdentityRepository, NewIdentity, ProfileChanges,
};

#[derive(Default)]
struct Tables {
    identities: BTreeMap<IdentityId, Identity>,
    ads: BTreeMap<AdId, Ad>,
    comments: BTreeMap<CommentId, Comment>,
    sequence: i32,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.sequence += 1;
        self.sequence
    }
}

/// Every table behind one lock, so an ad delete cascades atomically.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

#[async_trait]
impl IdentityRepository for MemoryStore {
    async fn find_by_id(&self, id: IdentityId) -> Result<Option<Identity>> {
        Ok(self.tables.read().await.identities.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>> {
        let tables = self.tables.read().await;
        Ok(tables
            .identities
            .values()
            .find(|identity| identity.email == email)
            .cloned())
    }

    async fn create(&self, identity: NewIdentity) -> Result<Identity> {
        let mut tables = self.tables.write().await;
        if tables.identities.values().any(|i| i.email == identity.email) {
            return Err(ServerError::EmailTaken(identity.email));
        }

        let identity = Identity {
            id: IdentityId(tables.next_id()),
            email: identity.email,
            password_hash: identity.password_hash,
            first_name: identity.first_name,
            last_name: identity.last_name,
            phone: identity.phone,
            role: identity.role,
            avatar: None,
        };
        tables.identities.insert(identity.id, identity.clone());

        Ok(identity)
    }

    async fn update_profile(
        &self,
        id: IdentityId,
        changes: ProfileChanges,
    ) -> Result<Identity> {
        let mut tables = self.tables.write().await;
        match tables.identities.get_mut(&id) {
            Some(stored) => {
                stored.apply(changes);
                Ok(stored.clone())
            },
            None => Err(ServerError::not_found(format!("user {id}"))),
        }
    }

    async fn set_password_hash(
        &self,
        id: IdentityId,
        expected: &str,
        new: &str,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.identities.get_mut(&id) {
            Some(stored) if stored.password_hash == expected => {
                stored.password_hash = new.to_owned();
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn set_avatar(
        &self,
        id: IdentityId,
        expected: Option<&AssetReference>,
        new: &AssetReference,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.identities.get_mut(&id) {
            Some(stored) if stored.avatar.as_ref() == expected => {
                stored.avatar = Some(new.clone());
                Ok(true)
            },
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl AdRepository for MemoryStore {
    async fn find_by_id(&self, id: AdId) -> Result<Option<Ad>> {
        Ok(self.tables.read().await.ads.get(&id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<Ad>> {
        Ok(self.tables.read().await.ads.values().cloned().collect())
    }

    async fn find_by_owner(&self, owner: IdentityId) -> Result<Vec<Ad>> {
        let tables = self.tables.read().await;
        Ok(tables
            .ads
            .values()
            .filter(|ad| ad.owner == owner)
            .cloned()
            .collect())
    }

    async fn create(&self, ad: NewAd) -> Result<Ad> {
        let mut tables = self.tables.write().await;
        if !tables.identities.contains_key(&ad.owner) {
            return Err(ServerError::not_found(format!("user {}", ad.owner)));
        }

        let ad = Ad {
            id: AdId(tables.next_id()),
            title: ad.title,
            description: ad.description,
            price: ad.price,
            image: ad.image,
            owner: ad.owner,
        };
        tables.ads.insert(ad.id, ad.clone());

        Ok(ad)
    }

    async fn update_fields(&self, id: AdId, changes: AdChanges) -> Result<Ad> {
        let mut tables = self.tables.write().await;
        match tables.ads.get_mut(&id) {
            Some(stored) => {
                stored.apply(changes);
                Ok(stored.clone())
            },
            None => Err(ServerError::not_found(format!("ad {id}"))),
        }
    }

    async fn set_image(
        &self,
        id: AdId,
        expected: Option<&AssetReference>,
        new: &AssetReference,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.ads.get_mut(&id) {
            Some(stored) if stored.image.as_ref() == expected => {
                stored.image = Some(new.clone());
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: AdId) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.ads.remove(&id);
        tables.comments.retain(|_, comment| comment.ad != id);
        Ok(())
    }
}

#[async_trait]
impl CommentRepository for MemoryStore {
    async fn find_by_ad(&self, ad: AdId) -> Result<Vec<Comment>> {
        let tables = self.tables.read().await;
        let mut comments: Vec<Comment> = tables
            .comments
            .values()
            .filter(|comment| comment.ad == ad)
            .cloned()
            .collect();
        comments.sort_by(|a, b| {
            b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
        });
        Ok(comments)
    }

    async fn find(&self, ad: AdId, id: CommentId) -> Result<Option<Comment>> {
        let tables = self.tables.read().await;
        Ok(tables.comments.get(&id).filter(|c| c.ad == ad).cloned())
    }

    async fn create(&self, comment: NewComment) -> Result<Comment> {
        let mut tables = self.tables.write().await;
        if !tables.ads.contains_key(&comment.ad) {
            return Err(ServerError::not_found(format!("ad {}", comment.ad)));
        }

        let comment = Comment {
            id: CommentId(tables.next_id()),
            ad: comment.ad,
            author: comment.author,
            text: comment.text,
            created_at: comment.created_at,
        };
        tables.comments.insert(comment.id, comment.clone());

        Ok(comment)
    }

    async fn update(&self, comment: &Comment) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.comments.get_mut(&comment.id) {
            Some(stored) => {
                stored.text = comment.text.clone();
                Ok(())
            },
            None => Err(ServerError::not_found(format!("comment {}", comment.id))),
        }
    }

    async fn delete(&self, id: CommentId) -> Result<()> {
        self.tables.write().await.comments.remove(&id);
        Ok(())
    }
}
