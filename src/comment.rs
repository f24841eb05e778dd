//! Comments left on ads.

pub mod service;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use service::CommentManager;

use crate::ad::AdId;
use crate::asset::AssetReference;
use crate::error::Result;
use crate::identity::IdentityId;

/// Primary key of a [`Comment`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CommentId(pub i32);

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Comment as saved on the record store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: CommentId,
    pub ad: AdId,
    pub author: IdentityId,
    pub text: String,
    /// Stamped by the server when the comment is first saved.
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub ad: AdId,
    pub author: IdentityId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Comment with the author fields shown next to it.
#[derive(Debug, Clone)]
pub struct CommentDetails {
    pub comment: Comment,
    pub author_first_name: String,
    pub author_image: Option<AssetReference>,
}

/// Port for comment persistence.
#[async_trait::async_trait]
pub trait CommentRepository: Send + Sync {
    /// Comments of `ad`, newest first.
    async fn find_by_ad(&self, ad: AdId) -> Result<Vec<Comment>>;
    /// Lookup restricted to comments of `ad`.
    async fn find(&self, ad: AdId, id: CommentId) -> Result<Option<Comment>>;
    async fn create(&self, comment: NewComment) -> Result<Comment>;
    /// Only the text is mutable.
    async fn update(&self, comment: &Comment) -> Result<()>;
    async fn delete(&self, id: CommentId) -> Result<()>;
}
