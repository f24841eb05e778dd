//! PostgreSQL record store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::ad::{Ad, AdChanges, AdId, AdRepository, NewAd};
use crate::asset::AssetReference;
use crate::comment::{Comment, CommentId, CommentRepository, NewComment};
use crate::error::{Result, ServerError};
use crate::identity::{
    Identity, IdentityId, IdentityRepository, NewIdentity, ProfileChanges, Role,
};

const IDENTITY_COLUMNS: &str =
    "id, email, password, first_name, last_name, phone, role, avatar";
const AD_COLUMNS: &str = "id, title, description, price, image, owner_id";
const COMMENT_COLUMNS: &str = "id, ad_id, author_id, text, created_at";

#[derive(sqlx::FromRow)]
struct IdentityRecord {
    id: i32,
    email: String,
    password: String,
    first_name: String,
    last_name: String,
    phone: String,
    role: String,
    avatar: Option<String>,
}

impl TryFrom<IdentityRecord> for Identity {
    type Error = ServerError;

    fn try_from(record: IdentityRecord) -> Result<Self> {
        let role = Role::parse(&record.role).ok_or_else(|| ServerError::Internal {
            details: format!("unknown role {:?} for user {}", record.role, record.id),
            source: None,
        })?;

        Ok(Identity {
            id: IdentityId(record.id),
            email: record.email,
            password_hash: record.password,
            first_name: record.first_name,
            last_name: record.last_name,
            phone: record.phone,
            role,
            avatar: record.avatar.map(AssetReference::new),
        })
    }
}

#[derive(sqlx::FromRow)]
struct AdRecord {
    id: i32,
    title: String,
    description: String,
    price: i32,
    image: Option<String>,
    owner_id: i32,
}

impl From<AdRecord> for Ad {
    fn from(record: AdRecord) -> Self {
        Ad {
            id: AdId(record.id),
            title: record.title,
            description: record.description,
            price: record.price,
            image: record.image.map(AssetReference::new),
            owner: IdentityId(record.owner_id),
        }
    }
}

#[derive(sqlx::FromRow)]
struct CommentRecord {
    id: i32,
    ad_id: i32,
    author_id: i32,
    text: String,
    created_at: DateTime<Utc>,
}

impl From<CommentRecord> for Comment {
    fn from(record: CommentRecord) -> Self {
        Comment {
            id: CommentId(record.id),
            ad: AdId(record.ad_id),
            author: IdentityId(record.author_id),
            text: record.text,
            created_at: record.created_at,
        }
    }
}

/// PostgreSQL identity repository.
#[derive(Clone)]
pub struct PgIdentityRepository {
    pool: PgPool,
}

impl PgIdentityRepository {
    /// Create a new [`PgIdentityRepository`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityRepository for PgIdentityRepository {
    async fn find_by_id(&self, id: IdentityId) -> Result<Option<Identity>> {
        sqlx::query_as::<_, IdentityRecord>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?
        .map(Identity::try_from)
        .transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>> {
        sqlx::query_as::<_, IdentityRecord>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .map(Identity::try_from)
        .transpose()
    }

    async fn create(&self, identity: NewIdentity) -> Result<Identity> {
        let record = sqlx::query_as::<_, IdentityRecord>(&format!(
            r#"INSERT INTO users (email, password, first_name, last_name, phone, role)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING {IDENTITY_COLUMNS}"#
        ))
        .bind(&identity.email)
        .bind(&identity.password_hash)
        .bind(&identity.first_name)
        .bind(&identity.last_name)
        .bind(&identity.phone)
        .bind(identity.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                ServerError::EmailTaken(identity.email.clone())
            },
            err => ServerError::Sql(err),
        })?;

        Identity::try_from(record)
    }

    async fn update_profile(
        &self,
        id: IdentityId,
        changes: ProfileChanges,
    ) -> Result<Identity> {
        sqlx::query_as::<_, IdentityRecord>(&format!(
            r#"UPDATE users
                SET first_name = COALESCE($2, first_name),
                    last_name = COALESCE($3, last_name),
                    phone = COALESCE($4, phone)
                WHERE id = $1
                RETURNING {IDENTITY_COLUMNS}"#
        ))
        .bind(id.get())
        .bind(changes.first_name)
        .bind(changes.last_name)
        .bind(changes.phone)
        .fetch_optional(&self.pool)
        .await?
        .map(Identity::try_from)
        .transpose()?
        .ok_or_else(|| ServerError::not_found(format!("user {id}")))
    }

    async fn set_password_hash(
        &self,
        id: IdentityId,
        expected: &str,
        new: &str,
    ) -> Result<bool> {
        let result =
            sqlx::query("UPDATE users SET password = $3 WHERE id = $1 AND password = $2")
                .bind(id.get())
                .bind(expected)
                .bind(new)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_avatar(
        &self,
        id: IdentityId,
        expected: Option<&AssetReference>,
        new: &AssetReference,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET avatar = $3 WHERE id = $1 AND avatar IS NOT DISTINCT FROM $2",
        )
        .bind(id.get())
        .bind(expected.map(AssetReference::as_str))
        .bind(new.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

/// PostgreSQL ad repository.
#[derive(Clone)]
pub struct PgAdRepository {
    pool: PgPool,
}

impl PgAdRepository {
    /// Create a new [`PgAdRepository`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AdRepository for PgAdRepository {
    async fn find_by_id(&self, id: AdId) -> Result<Option<Ad>> {
        let record = sqlx::query_as::<_, AdRecord>(&format!(
            "SELECT {AD_COLUMNS} FROM ads WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Ad::from))
    }

    async fn find_all(&self) -> Result<Vec<Ad>> {
        let records = sqlx::query_as::<_, AdRecord>(&format!(
            "SELECT {AD_COLUMNS} FROM ads ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Ad::from).collect())
    }

    async fn find_by_owner(&self, owner: IdentityId) -> Result<Vec<Ad>> {
        let records = sqlx::query_as::<_, AdRecord>(&format!(
            "SELECT {AD_COLUMNS} FROM ads WHERE owner_id = $1 ORDER BY id"
        ))
        .bind(owner.get())
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Ad::from).collect())
    }

    async fn create(&self, ad: NewAd) -> Result<Ad> {
        let record = sqlx::query_as::<_, AdRecord>(&format!(
            r#"INSERT INTO ads (title, description, price, image, owner_id)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING {AD_COLUMNS}"#
        ))
        .bind(&ad.title)
        .bind(&ad.description)
        .bind(ad.price)
        .bind(ad.image.as_ref().map(AssetReference::as_str))
        .bind(ad.owner.get())
        .fetch_one(&self.pool)
        .await?;

        Ok(record.into())
    }

    async fn update_fields(&self, id: AdId, changes: AdChanges) -> Result<Ad> {
        let record = sqlx::query_as::<_, AdRecord>(&format!(
            r#"UPDATE ads
                SET title = COALESCE($2, title),
                    description = COALESCE($3, description),
                    price = COALESCE($4, price)
                WHERE id = $1
                RETURNING {AD_COLUMNS}"#
        ))
        .bind(id.0)
        .bind(changes.title)
        .bind(changes.description)
        .bind(changes.price)
        .fetch_optional(&self.pool)
        .await?;

        record
            .map(Ad::from)
            .ok_or_else(|| ServerError::not_found(format!("ad {id}")))
    }

    async fn set_image(
        &self,
        id: AdId,
        expected: Option<&AssetReference>,
        new: &AssetReference,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE ads SET image = $3 WHERE id = $1 AND image IS NOT DISTINCT FROM $2",
        )
        .bind(id.0)
        .bind(expected.map(AssetReference::as_str))
        .bind(new.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, id: AdId) -> Result<()> {
        // Comments go with the `ON DELETE CASCADE` foreign key.
        sqlx::query("DELETE FROM ads WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// PostgreSQL comment repository.
#[derive(Clone)]
pub struct PgCommentRepository {
    pool: PgPool,
}

impl PgCommentRepository {
    /// Create a new [`PgCommentRepository`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CommentRepository for PgCommentRepository {
    async fn find_by_ad(&self, ad: AdId) -> Result<Vec<Comment>> {
        let records = sqlx::query_as::<_, CommentRecord>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE ad_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(ad.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Comment::from).collect())
    }

    async fn find(&self, ad: AdId, id: CommentId) -> Result<Option<Comment>> {
        let record = sqlx::query_as::<_, CommentRecord>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1 AND ad_id = $2"
        ))
        .bind(id.0)
        .bind(ad.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Comment::from))
    }

    async fn create(&self, comment: NewComment) -> Result<Comment> {
        let record = sqlx::query_as::<_, CommentRecord>(&format!(
            r#"INSERT INTO comments (ad_id, author_id, text, created_at)
                VALUES ($1, $2, $3, $4)
                RETURNING {COMMENT_COLUMNS}"#
        ))
        .bind(comment.ad.0)
        .bind(comment.author.get())
        .bind(&comment.text)
        .bind(comment.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(record.into())
    }

    async fn update(&self, comment: &Comment) -> Result<()> {
        let result = sqlx::query("UPDATE comments SET text = $2 WHERE id = $1")
            .bind(comment.id.0)
            .bind(&comment.text)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServerError::not_found(format!("comment {}", comment.id)));
        }

        Ok(())
    }

    async fn delete(&self, id: CommentId) -> Result<()> {
        sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
