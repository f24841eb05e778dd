//! HTTP boundary: identity resolution, body validation and multipart parsing.
pub mod ads;
pub mod auth;
pub mod comments;
pub mod images;
pub mod users;

use std::sync::LazyLock;

use axum::extract::multipart::Multipart;
use axum::extract::{FromRequest, Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use axum::Json;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex_lite::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::asset::UploadedFile;
use crate::{AppState, ServerError};

const BASIC: &str = "Basic ";
/// Room for multipart framing and the `properties` part on top of the file.
const UPLOAD_OVERHEAD: usize = 64 * 1024;
const PHONE_PATTERN: &str = r"^\+7\s?\(?\d{3}\)?\s?\d{3}-?\d{2}-?\d{2}$";

static PHONE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(PHONE_PATTERN).ok());

/// JSON body that passed [`Validate`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// List wrapper shared by collection endpoints.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    count: usize,
    results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(results: Vec<T>) -> Self {
        Self {
            count: results.len(),
            results,
        }
    }
}

/// Request body limit of upload routes.
///
/// Kept above the file ceiling so oversize files reach the asset validator.
pub fn upload_limit(state: &AppState) -> usize {
    usize::try_from(state.config.storage.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(UPLOAD_OVERHEAD)
}

/// `+7 (XXX) XXX-XX-XX` and its looser spellings.
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    match PHONE.as_ref() {
        Some(re) if re.is_match(phone) => Ok(()),
        _ => Err(ValidationError::new("phone")
            .with_message("Phone must match +7 (XXX) XXX-XX-XX.".into())),
    }
}

/// Custom middleware for authentification.
///
/// Resolves HTTP Basic credentials to an [`crate::identity::Identity`] and
/// hands it to the handler as an extension.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let (email, password) =
        basic_credentials(req.headers()).ok_or(ServerError::Unauthorized)?;
    let identity = state.accounts.authenticate(&email, &password).await?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix(BASIC)?;
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (email, password) = decoded.split_once(':')?;

    Some((email.to_owned(), password.to_owned()))
}

/// Parts of a multipart upload.
#[derive(Debug, Default)]
pub struct Upload {
    pub image: Option<UploadedFile>,
    pub properties: Option<Vec<u8>>,
}

impl Upload {
    /// Drain `multipart`, keeping the `image` and `properties` parts.
    pub async fn read(mut multipart: Multipart) -> Result<Self, ServerError> {
        let mut upload = Upload::default();

        while let Some(field) = multipart.next_field().await? {
            match field.name() {
                Some("image") => {
                    let file_name = field.file_name().map(str::to_owned);
                    let content_type = field.content_type().map(str::to_owned);
                    let bytes = field.bytes().await?;
                    upload.image =
                        Some(UploadedFile::new(file_name, content_type, bytes.to_vec()));
                },
                Some("properties") => {
                    upload.properties = Some(field.bytes().await?.to_vec());
                },
                other => {
                    tracing::debug!(field = ?other, "ignoring multipart field");
                },
            }
        }

        Ok(upload)
    }

    /// Decode and validate the `properties` part.
    pub fn properties<T>(&self) -> Result<T, ServerError>
    where
        T: DeserializeOwned + Validate,
    {
        let invalid = |message: &'static str| {
            let mut errors = ValidationErrors::new();
            errors.add(
                "properties",
                ValidationError::new("properties").with_message(message.into()),
            );
            ServerError::Validation(errors)
        };

        let raw = self
            .properties
            .as_deref()
            .ok_or_else(|| invalid("Missing 'properties' part."))?;
        let value: T = serde_json::from_slice(raw)
            .map_err(|_| invalid("'properties' part is not valid JSON."))?;
        value.validate()?;

        Ok(value)
    }
}
