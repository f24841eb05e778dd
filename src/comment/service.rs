//! Comment lifecycle.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ad::{AdId, AdRepository};
use crate::clock::Clock;
use crate::comment::{
    Comment, CommentDetails, CommentId, CommentRepository, NewComment,
};
use crate::error::{Result, ServerError};
use crate::guard;
use crate::identity::{Identity, IdentityId, IdentityRepository};

const RESOURCE: &str = "comment";

#[derive(Clone)]
pub struct CommentManager {
    ads: Arc<dyn AdRepository>,
    comments: Arc<dyn CommentRepository>,
    identities: Arc<dyn IdentityRepository>,
    clock: Arc<dyn Clock>,
}

impl CommentManager {
    /// Create a new [`CommentManager`].
    pub fn new(
        ads: Arc<dyn AdRepository>,
        comments: Arc<dyn CommentRepository>,
        identities: Arc<dyn IdentityRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ads,
            comments,
            identities,
            clock,
        }
    }

    /// Comments of an existing ad, newest first.
    pub async fn list(&self, ad: AdId) -> Result<Vec<CommentDetails>> {
        self.ensure_ad(ad).await?;

        let comments = self.comments.find_by_ad(ad).await?;
        let mut authors: HashMap<IdentityId, Identity> = HashMap::new();
        let mut details = Vec::with_capacity(comments.len());

        for comment in comments {
            if !authors.contains_key(&comment.author) {
                let author = self.author(comment.author).await?;
                authors.insert(author.id, author);
            }
            if let Some(author) = authors.get(&comment.author) {
                details.push(describe(comment, author));
            }
        }

        Ok(details)
    }

    /// Comment on `ad` as `acting`.
    pub async fn create(
        &self,
        ad: AdId,
        acting: &Identity,
        text: String,
    ) -> Result<CommentDetails> {
        self.ensure_ad(ad).await?;

        let comment = self
            .comments
            .create(NewComment {
                ad,
                author: acting.id,
                text,
                created_at: self.clock.now(),
            })
            .await?;

        tracing::info!(ad_id = %ad, comment_id = %comment.id, user_id = %acting.id, "comment created");
        Ok(describe(comment, acting))
    }

    /// Replace the text of a comment.
    pub async fn update(
        &self,
        ad: AdId,
        id: CommentId,
        acting: &Identity,
        text: String,
    ) -> Result<CommentDetails> {
        let mut comment = self.load(ad, id).await?;
        guard::ensure(comment.author, acting, RESOURCE)?;

        comment.text = text;
        self.comments.update(&comment).await?;

        tracing::info!(ad_id = %ad, comment_id = %id, user_id = %acting.id, "comment updated");
        let author = if comment.author == acting.id {
            acting.clone()
        } else {
            self.author(comment.author).await?
        };
        Ok(describe(comment, &author))
    }

    pub async fn delete(
        &self,
        ad: AdId,
        id: CommentId,
        acting: &Identity,
    ) -> Result<()> {
        let comment = self.load(ad, id).await?;
        guard::ensure(comment.author, acting, RESOURCE)?;

        self.comments.delete(id).await?;

        tracing::info!(ad_id = %ad, comment_id = %id, user_id = %acting.id, "comment deleted");
        Ok(())
    }

    async fn ensure_ad(&self, ad: AdId) -> Result<()> {
        match self.ads.find_by_id(ad).await? {
            Some(_) => Ok(()),
            None => Err(ServerError::not_found(format!("ad {ad}"))),
        }
    }

    async fn load(&self, ad: AdId, id: CommentId) -> Result<Comment> {
        self.comments
            .find(ad, id)
            .await?
            .ok_or_else(|| ServerError::not_found(format!("comment {id} on ad {ad}")))
    }

    async fn author(&self, id: IdentityId) -> Result<Identity> {
        self.identities
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServerError::not_found(format!("user {id}")))
    }
}

fn describe(comment: Comment, author: &Identity) -> CommentDetails {
    CommentDetails {
        comment,
        author_first_name: author.first_name.clone(),
        author_image: author.avatar.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Role;
    use crate::testing::{Fixture, noon};

    #[tokio::test]
    async fn test_create_stamps_time() {
        let fx = Fixture::new().await;
        let owner = fx.identity("owner@adboard.local", Role::Member).await;
        let ad = fx.ad(&owner).await;

        let created = fx
            .comments
            .create(ad.id, &owner, "Still available?".into())
            .await
            .unwrap();
        assert_eq!(created.comment.created_at, noon());
        assert_eq!(created.author_first_name, "Ivan");

        assert!(matches!(
            fx.comments.create(AdId(404), &owner, "Still available?".into()).await,
            Err(ServerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_compound_lookup() {
        let fx = Fixture::new().await;
        let owner = fx.identity("owner@adboard.local", Role::Member).await;
        let first = fx.ad(&owner).await;
        let second = fx.ad(&owner).await;

        let comment = fx
            .comments
            .create(first.id, &owner, "Still available?".into())
            .await
            .unwrap();

        assert!(matches!(
            fx.comments.delete(second.id, comment.comment.id, &owner).await,
            Err(ServerError::NotFound { .. })
        ));
        assert_eq!(fx.comments.list(first.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ownership() {
        let fx = Fixture::new().await;
        let owner = fx.identity("owner@adboard.local", Role::Member).await;
        let stranger = fx.identity("stranger@adboard.local", Role::Member).await;
        let admin = fx.identity("admin@adboard.local", Role::Administrator).await;
        let ad = fx.ad(&owner).await;

        let id = fx
            .comments
            .create(ad.id, &owner, "Still available?".into())
            .await
            .unwrap()
            .comment
            .id;

        assert!(matches!(
            fx.comments.update(ad.id, id, &stranger, "Hijacked text".into()).await,
            Err(ServerError::Forbidden { resource: "comment" })
        ));
        assert!(matches!(
            fx.comments.delete(ad.id, id, &stranger).await,
            Err(ServerError::Forbidden { .. })
        ));

        let updated = fx
            .comments
            .update(ad.id, id, &admin, "Moderated text".into())
            .await
            .unwrap();
        assert_eq!(updated.comment.text, "Moderated text");
        assert_eq!(updated.comment.author, owner.id);
        assert_eq!(updated.author_first_name, owner.first_name);

        fx.comments.delete(ad.id, id, &admin).await.unwrap();
        assert!(fx.comments.list(ad.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_newest_first_and_cascade() {
        let fx = Fixture::new().await;
        let owner = fx.identity("owner@adboard.local", Role::Member).await;
        let ad = fx.ad(&owner).await;

        for text in ["First comment", "Second comment"] {
            fx.comments.create(ad.id, &owner, text.into()).await.unwrap();
        }

        let listed = fx.comments.list(ad.id).await.unwrap();
        let texts: Vec<_> = listed.iter().map(|c| c.comment.text.as_str()).collect();
        assert_eq!(texts, ["Second comment", "First comment"]);

        fx.ads.delete(ad.id, &owner).await.unwrap();
        assert!(matches!(
            fx.comments.list(ad.id).await,
            Err(ServerError::NotFound { .. })
        ));
    }
}
