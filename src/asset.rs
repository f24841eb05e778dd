//! Image assets referenced by identities and ads.
//!
//! Assets live in one of two flat directories ("buckets"). Records never store
//! a filesystem path, only an [`AssetReference`]: the public URL prefix of the
//! bucket followed by the generated file name.

pub mod store;
pub mod validator;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::IdentityId;

/// Logical storage area of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    /// User avatars.
    Avatars,
    /// Ad photos.
    AdImages,
}

impl Bucket {
    /// Public URL prefix of the bucket, slash-terminated.
    pub const fn url_prefix(self) -> &'static str {
        match self {
            Bucket::Avatars => "/avatars/",
            Bucket::AdImages => "/ads-images/",
        }
    }

    /// Label used on logs and metrics.
    pub const fn label(self) -> &'static str {
        match self {
            Bucket::Avatars => "avatars",
            Bucket::AdImages => "ads-images",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Externally addressable pointer to a stored file, e.g. `/avatars/3f9a.jpg`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetReference(String);

impl AssetReference {
    /// Wrap a reference read back from the record store.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Build the reference of `file_name` inside `bucket`.
    pub fn within(bucket: Bucket, file_name: &str) -> Self {
        Self(format!("{}{file_name}", bucket.url_prefix()))
    }

    /// Returns the same string as a string slice `&str`.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AssetReference {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// File received from a client, not yet validated.
#[derive(Clone, Default)]
pub struct UploadedFile {
    /// Name given by the client, used only to derive the extension.
    pub file_name: Option<String>,
    /// Declared MIME type.
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(
        file_name: Option<String>,
        content_type: Option<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name,
            content_type,
            bytes: bytes.into(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedFile")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Stored file resolved back to bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

/// How [`store::AssetStore::save`] names a new file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Naming {
    /// Random hex token, unique per save.
    Random,
    /// Derived from the owning identity's key.
    Owner(IdentityId),
}

/// Avatar naming strategy as written on `config.yaml`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvatarNaming {
    #[default]
    Random,
    Owner,
}

impl AvatarNaming {
    /// Resolve the strategy for a given avatar owner.
    pub fn for_owner(self, owner: IdentityId) -> Naming {
        match self {
            AvatarNaming::Random => Naming::Random,
            AvatarNaming::Owner => Naming::Owner(owner),
        }
    }
}
