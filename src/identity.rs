//! Registered accounts and the port used to persist them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::asset::AssetReference;
use crate::error::Result;

/// Primary key of an [`Identity`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct IdentityId(pub i32);

impl IdentityId {
    #[inline]
    pub fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authorization level of an identity.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[default]
    #[serde(rename = "USER")]
    Member,
    #[serde(rename = "ADMIN")]
    Administrator,
}

impl Role {
    /// Stored representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Member => "USER",
            Role::Administrator => "ADMIN",
        }
    }

    /// Parse the stored representation back.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "USER" => Some(Role::Member),
            "ADMIN" => Some(Role::Administrator),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User account as saved on the record store.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: IdentityId,
    /// Unique, case-sensitive login.
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub role: Role,
    pub avatar: Option<AssetReference>,
}

impl Identity {
    #[inline]
    pub fn is_administrator(&self) -> bool {
        self.role == Role::Administrator
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password_hash", &"[REDACTED]")
            .field("role", &self.role)
            .field("avatar", &self.avatar)
            .finish()
    }
}

/// Identity not yet persisted. The key is assigned by the record store.
#[derive(Clone)]
pub struct NewIdentity {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub role: Role,
}

/// Partial profile update. Email and role are not part of it.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

impl Identity {
    /// Merge the provided profile fields.
    pub fn apply(&mut self, changes: ProfileChanges) {
        if let Some(first_name) = changes.first_name {
            self.first_name = first_name;
        }
        if let Some(last_name) = changes.last_name {
            self.last_name = last_name;
        }
        if let Some(phone) = changes.phone {
            self.phone = phone;
        }
    }
}

/// Port for identity persistence.
///
/// Each write targets its own columns so concurrent requests on one account
/// never undo each other.
#[async_trait::async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn find_by_id(&self, id: IdentityId) -> Result<Option<Identity>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>>;
    /// Fails with [`crate::error::ServerError::EmailTaken`] on duplicate email.
    async fn create(&self, identity: NewIdentity) -> Result<Identity>;
    /// Write names and phone, returning the stored record.
    async fn update_profile(
        &self,
        id: IdentityId,
        changes: ProfileChanges,
    ) -> Result<Identity>;
    /// Swap the hash only while the stored one is still `expected`.
    async fn set_password_hash(
        &self,
        id: IdentityId,
        expected: &str,
        new: &str,
    ) -> Result<bool>;
    /// Swap the avatar only while the stored one is still `expected`.
    async fn set_avatar(
        &self,
        id: IdentityId,
        expected: Option<&AssetReference>,
        new: &AssetReference,
    ) -> Result<bool>;
}
