//! Gate run on every uploaded image before any byte reaches the disk.

use crate::asset::UploadedFile;

/// MIME types accepted for avatars and ad photos.
pub const ALLOWED_CONTENT_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/bmp",
    "image/webp",
];

/// Default size ceiling: 5 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// Reasons an upload is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssetRejection {
    #[error("uploaded file is empty or missing")]
    EmptyFile,
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("file exceeds the {limit} bytes limit")]
    TooLarge { limit: u64 },
}

/// Check an upload against emptiness, the type allow-list and `max_size`.
///
/// Checks run in that order, so an empty file is reported as
/// [`AssetRejection::EmptyFile`] whatever its declared type.
pub fn validate(
    file: Option<&UploadedFile>,
    max_size: u64,
) -> Result<(), AssetRejection> {
    let file = match file {
        Some(file) if !file.is_empty() => file,
        _ => return Err(AssetRejection::EmptyFile),
    };

    match file.content_type.as_deref() {
        Some(kind) if ALLOWED_CONTENT_TYPES.contains(&kind) => (),
        other => {
            return Err(AssetRejection::UnsupportedType(
                other.unwrap_or("none").to_owned(),
            ));
        },
    }

    if file.len() as u64 > max_size {
        return Err(AssetRejection::TooLarge { limit: max_size });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(kind: &str, len: usize) -> UploadedFile {
        UploadedFile::new(
            Some("photo.jpg".into()),
            Some(kind.into()),
            vec![0xAB; len],
        )
    }

    #[test]
    fn test_empty_file() {
        assert_eq!(
            validate(None, DEFAULT_MAX_FILE_SIZE),
            Err(AssetRejection::EmptyFile)
        );

        for kind in ["image/png", "text/plain"] {
            assert_eq!(
                validate(Some(&file(kind, 0)), DEFAULT_MAX_FILE_SIZE),
                Err(AssetRejection::EmptyFile)
            );
        }
    }

    #[test]
    fn test_content_types() {
        for kind in ALLOWED_CONTENT_TYPES {
            assert!(validate(Some(&file(kind, 10)), DEFAULT_MAX_FILE_SIZE).is_ok());
        }

        for kind in ["image/svg+xml", "application/pdf", "IMAGE/PNG"] {
            assert_eq!(
                validate(Some(&file(kind, 10)), DEFAULT_MAX_FILE_SIZE),
                Err(AssetRejection::UnsupportedType(kind.into()))
            );
        }

        let untyped = UploadedFile::new(None, None, vec![1, 2, 3]);
        assert_eq!(
            validate(Some(&untyped), DEFAULT_MAX_FILE_SIZE),
            Err(AssetRejection::UnsupportedType("none".into()))
        );
    }

    #[test]
    fn test_size_boundary() {
        let exact = file("image/jpeg", DEFAULT_MAX_FILE_SIZE as usize);
        assert!(validate(Some(&exact), DEFAULT_MAX_FILE_SIZE).is_ok());

        let over = file("image/jpeg", DEFAULT_MAX_FILE_SIZE as usize + 1);
        assert_eq!(
            validate(Some(&over), DEFAULT_MAX_FILE_SIZE),
            Err(AssetRejection::TooLarge {
                limit: DEFAULT_MAX_FILE_SIZE
            })
        );
    }
}
