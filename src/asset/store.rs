//! Filesystem-backed asset store.
//!
//! Each [`Bucket`] maps to one flat directory. Files are named by
//! [`Naming`] plus the lower-cased extension of the uploaded file name.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rand::RngCore;
use rand::rngs::OsRng;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::asset::{Asset, AssetReference, Bucket, Naming, UploadedFile};
use crate::error::{Result, ServerError};

const TOKEN_BYTES: usize = 16;
const MAX_EXTENSION_LENGTH: usize = 10;
const OCTET_STREAM: &str = "application/octet-stream";

/// File written by [`AssetStore::stage`], not yet committed.
#[derive(Debug)]
pub struct StagedAsset {
    reference: AssetReference,
    bucket: Bucket,
    path: PathBuf,
    /// Temporary file renamed onto `path` on commit.
    pending: Option<PathBuf>,
    size: usize,
}

impl StagedAsset {
    /// Reference the file will have once committed.
    #[inline]
    pub fn reference(&self) -> &AssetReference {
        &self.reference
    }
}

/// Persists, resolves and removes image files.
#[derive(Debug, Clone)]
pub struct AssetStore {
    avatars: PathBuf,
    ad_images: PathBuf,
}

impl AssetStore {
    /// Create a new [`AssetStore`].
    pub fn new(avatars: impl Into<PathBuf>, ad_images: impl Into<PathBuf>) -> Self {
        Self {
            avatars: avatars.into(),
            ad_images: ad_images.into(),
        }
    }

    /// Directory backing `bucket`.
    pub fn directory(&self, bucket: Bucket) -> &Path {
        match bucket {
            Bucket::Avatars => &self.avatars,
            Bucket::AdImages => &self.ad_images,
        }
    }

    /// Create bucket directories if they are absent.
    ///
    /// Failures are only logged: [`AssetStore::save`] retries the creation.
    pub async fn init(&self) {
        for bucket in [Bucket::Avatars, Bucket::AdImages] {
            let dir = self.directory(bucket);
            match fs::create_dir_all(dir).await {
                Ok(()) => {
                    tracing::debug!(%bucket, path = %dir.display(), "bucket directory ready")
                },
                Err(err) => tracing::error!(
                    %bucket,
                    path = %dir.display(),
                    error = %err,
                    "failed to create bucket directory"
                ),
            }
        }
    }

    /// Write `file` into `bucket` and return its reference.
    ///
    /// The file must already have passed [`crate::asset::validator::validate`].
    pub async fn save(
        &self,
        file: &UploadedFile,
        bucket: Bucket,
        naming: Naming,
    ) -> Result<AssetReference> {
        let staged = self.stage(file, bucket, naming).await?;
        self.commit(staged).await
    }

    /// Write `file` into `bucket` without exposing it under an existing name.
    ///
    /// Random names are opened with `create_new` and written in place.
    /// Owner names are written to a temporary sibling and only replace the
    /// previous file on [`AssetStore::commit`].
    pub async fn stage(
        &self,
        file: &UploadedFile,
        bucket: Bucket,
        naming: Naming,
    ) -> Result<StagedAsset> {
        let stem = match naming {
            Naming::Random => random_token(),
            Naming::Owner(owner) => owner.to_string(),
        };
        let file_name = match extension(file.file_name.as_deref()) {
            Some(ext) => format!("{stem}.{ext}"),
            None => stem,
        };

        let dir = self.directory(bucket);
        if let Err(err) = fs::create_dir_all(dir).await {
            tracing::error!(%bucket, path = %dir.display(), error = %err, "bucket directory unavailable");
            return Err(ServerError::StorageWrite(err));
        }

        let path = dir.join(&file_name);
        let pending = match naming {
            Naming::Random => None,
            Naming::Owner(_) => Some(dir.join(format!(".{}.tmp", random_token()))),
        };
        let target = pending.as_deref().unwrap_or(path.as_path());

        let mut handle = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(target)
            .await
        {
            Ok(handle) => handle,
            Err(err) => {
                tracing::error!(%bucket, path = %target.display(), error = %err, "failed to create image");
                return Err(ServerError::StorageWrite(err));
            },
        };

        let written = async {
            handle.write_all(&file.bytes).await?;
            handle.sync_all().await
        };
        if let Err(err) = written.await {
            drop(handle);
            remove_quietly(target).await;
            tracing::error!(%bucket, path = %target.display(), error = %err, "failed to save image");
            return Err(ServerError::StorageWrite(err));
        }

        Ok(StagedAsset {
            reference: AssetReference::within(bucket, &file_name),
            bucket,
            path,
            pending,
            size: file.len(),
        })
    }

    /// Make a staged file visible under its reference.
    ///
    /// A pending owner-named file atomically replaces the previous one. On
    /// failure the previous file is left as it was.
    pub async fn commit(&self, staged: StagedAsset) -> Result<AssetReference> {
        let bucket = staged.bucket;

        if let Some(pending) = &staged.pending {
            if let Err(err) = fs::rename(pending, &staged.path).await {
                remove_quietly(pending).await;
                tracing::error!(%bucket, path = %staged.path.display(), error = %err, "failed to publish image");
                return Err(ServerError::StorageWrite(err));
            }
        }

        metrics::counter!("assets_saved_total", "bucket" => bucket.label())
            .increment(1);
        tracing::info!(%bucket, path = %staged.path.display(), size = staged.size, "image saved");

        Ok(staged.reference)
    }

    /// Drop a staged file that will not be committed.
    pub async fn discard(&self, staged: StagedAsset) {
        let path = staged.pending.as_deref().unwrap_or(staged.path.as_path());
        remove_quietly(path).await;
        tracing::debug!(bucket = %staged.bucket, path = %path.display(), "staged image discarded");
    }

    /// Remove the file behind `reference`. Never fails.
    ///
    /// A missing file counts as removed. Other I/O errors are logged and
    /// swallowed: deletion always runs after the owning record was updated.
    pub async fn delete(&self, reference: &AssetReference, bucket: Bucket) {
        let Some(file_name) = file_name_of(reference.as_str()) else {
            tracing::warn!(%bucket, %reference, "refusing to delete unresolvable reference");
            return;
        };
        let path = self.directory(bucket).join(file_name);

        match fs::remove_file(&path).await {
            Ok(()) => {
                metrics::counter!("assets_deleted_total", "bucket" => bucket.label())
                    .increment(1);
                tracing::info!(%bucket, path = %path.display(), "image deleted");
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!(%bucket, path = %path.display(), "image already absent");
            },
            Err(err) => tracing::warn!(
                %bucket,
                path = %path.display(),
                error = %err,
                "failed to delete image"
            ),
        }
    }

    /// Resolve `reference` to its bytes and probed content type.
    ///
    /// Only the base name of `reference` is used, which keeps the lookup
    /// confined to the bucket directory.
    pub async fn read(&self, reference: &str, bucket: Bucket) -> Result<Asset> {
        let file_name = file_name_of(reference)
            .ok_or_else(|| ServerError::not_found(format!("image {reference}")))?;
        let path = self.directory(bucket).join(file_name);

        match fs::read(&path).await {
            Ok(bytes) => {
                let content_type = probe_content_type(&bytes);
                Ok(Asset {
                    bytes,
                    content_type,
                })
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(ServerError::not_found(format!("image {reference}")))
            },
            Err(source) => Err(ServerError::StorageRead {
                path: reference.to_owned(),
                source,
            }),
        }
    }
}

async fn remove_quietly(path: &Path) {
    match fs::remove_file(path).await {
        Err(err) if err.kind() != ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), error = %err, "failed to remove partial image")
        },
        _ => {},
    }
}

/// Lower-cased extension after the last `.` of `file_name`.
///
/// Anything that is not 1 to 10 ASCII alphanumeric characters is dropped.
pub fn extension(file_name: Option<&str>) -> Option<String> {
    let (_, ext) = file_name?.rsplit_once('.')?;

    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LENGTH
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }

    Some(ext.to_ascii_lowercase())
}

/// Base name of a stored reference, `None` for `.`, `..` or empty names.
fn file_name_of(reference: &str) -> Option<&str> {
    let name = reference.rsplit(['/', '\\']).next()?;
    match name {
        "" | "." | ".." => None,
        name => Some(name),
    }
}

/// Detect the image type from magic bytes.
pub fn probe_content_type(bytes: &[u8]) -> &'static str {
    use image::ImageFormat;

    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::Bmp) => "image/bmp",
        Ok(ImageFormat::WebP) => "image/webp",
        _ => OCTET_STREAM,
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::identity::IdentityId;

    pub const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
    pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00];

    pub fn jpeg() -> UploadedFile {
        UploadedFile::new(Some("photo.JPG".into()), Some("image/jpeg".into()), JPEG)
    }

    pub fn png() -> UploadedFile {
        UploadedFile::new(Some("new.png".into()), Some("image/png".into()), PNG)
    }

    pub fn store(root: &Path) -> AssetStore {
        AssetStore::new(root.join("avatars"), root.join("ads-images"))
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension(Some("photo.JPG")).as_deref(), Some("jpg"));
        assert_eq!(extension(Some("archive.tar.gz")).as_deref(), Some("gz"));
        assert_eq!(extension(Some("noext")), None);
        assert_eq!(extension(Some("trailing.")), None);
        assert_eq!(extension(Some("evil.jp/../../g")), None);
        assert_eq!(extension(None), None);
    }

    #[test]
    fn test_file_name_of() {
        assert_eq!(file_name_of("/avatars/a.png"), Some("a.png"));
        assert_eq!(file_name_of("/ads-images/../../etc/passwd"), Some("passwd"));
        assert_eq!(file_name_of("..\\..\\secret"), Some("secret"));
        assert_eq!(file_name_of("/avatars/.."), None);
        assert_eq!(file_name_of("/avatars/"), None);
    }

    #[test]
    fn test_probe_content_type() {
        assert_eq!(probe_content_type(JPEG), "image/jpeg");
        assert_eq!(probe_content_type(PNG), "image/png");
        assert_eq!(probe_content_type(b"GIF89a...."), "image/gif");
        assert_eq!(probe_content_type(b"plain text"), OCTET_STREAM);
    }

    #[tokio::test]
    async fn test_save_then_read() {
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path());

        let reference = store
            .save(&jpeg(), Bucket::AdImages, Naming::Random)
            .await
            .unwrap();
        assert!(reference.as_str().starts_with("/ads-images/"));
        assert!(reference.as_str().ends_with(".jpg"));

        let asset = store.read(reference.as_str(), Bucket::AdImages).await.unwrap();
        assert_eq!(asset.bytes, JPEG);
        assert_eq!(asset.content_type, "image/jpeg");

        // Wrong bucket does not resolve.
        assert!(matches!(
            store.read(reference.as_str(), Bucket::Avatars).await,
            Err(ServerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_random_names_are_unique() {
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path());

        let first = store.save(&png(), Bucket::Avatars, Naming::Random).await.unwrap();
        let second = store.save(&png(), Bucket::Avatars, Naming::Random).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_owner_naming() {
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path());

        let first = store
            .save(&png(), Bucket::Avatars, Naming::Owner(IdentityId(7)))
            .await
            .unwrap();
        assert_eq!(first.as_str(), "/avatars/7.png");

        let other = store
            .save(&png(), Bucket::Avatars, Naming::Owner(IdentityId(8)))
            .await
            .unwrap();
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn test_owner_file_is_replaced_only_on_commit() {
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path());
        let owner = Naming::Owner(IdentityId(7));

        let reference = store.save(&png(), Bucket::Avatars, owner).await.unwrap();
        let replacement =
            UploadedFile::new(Some("next.png".into()), Some("image/png".into()), &PNG[..8]);

        let staged = store.stage(&replacement, Bucket::Avatars, owner).await.unwrap();
        assert_eq!(staged.reference(), &reference);
        let current = store.read(reference.as_str(), Bucket::Avatars).await.unwrap();
        assert_eq!(current.bytes, PNG);

        store.discard(staged).await;
        let current = store.read(reference.as_str(), Bucket::Avatars).await.unwrap();
        assert_eq!(current.bytes, PNG);
        assert_eq!(std::fs::read_dir(root.path().join("avatars")).unwrap().count(), 1);

        let staged = store.stage(&replacement, Bucket::Avatars, owner).await.unwrap();
        store.commit(staged).await.unwrap();
        let current = store.read(reference.as_str(), Bucket::Avatars).await.unwrap();
        assert_eq!(current.bytes, &PNG[..8]);
        assert_eq!(std::fs::read_dir(root.path().join("avatars")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_unwritable_bucket() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let store = AssetStore::new(blocker.clone(), blocker.join("ads-images"));

        for bucket in [Bucket::Avatars, Bucket::AdImages] {
            assert!(matches!(
                store.save(&png(), bucket, Naming::Owner(IdentityId(7))).await,
                Err(ServerError::StorageWrite(_))
            ));
            assert!(matches!(
                store.save(&png(), bucket, Naming::Random).await,
                Err(ServerError::StorageWrite(_))
            ));
        }
        assert_eq!(std::fs::read(&blocker).unwrap(), b"not a directory");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path());

        let reference = store.save(&jpeg(), Bucket::AdImages, Naming::Random).await.unwrap();
        store.delete(&reference, Bucket::AdImages).await;
        store.delete(&reference, Bucket::AdImages).await;

        assert!(matches!(
            store.read(reference.as_str(), Bucket::AdImages).await,
            Err(ServerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_is_confined_to_bucket() {
        let root = tempfile::tempdir().unwrap();
        let store = store(root.path());
        store.init().await;
        std::fs::write(root.path().join("secret.png"), PNG).unwrap();

        assert!(matches!(
            store.read("/avatars/../secret.png", Bucket::Avatars).await,
            Err(ServerError::NotFound { .. })
        ));
        assert!(matches!(
            store.read("..", Bucket::Avatars).await,
            Err(ServerError::NotFound { .. })
        ));
    }
}
