//! Error handler for adboard.

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use sqlx::Error as SQLxError;
use thiserror::Error;
use validator::ValidationErrors;

use crate::asset::validator::AssetRejection;
use crate::crypto::CryptoError;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("you are not allowed to modify this {resource}")]
    Forbidden { resource: &'static str },

    #[error("{resource} was changed by another request, retry")]
    Conflict { resource: &'static str },

    #[error(transparent)]
    InvalidAsset(#[from] AssetRejection),

    #[error("current password is wrong")]
    InvalidCurrentPassword,

    #[error("failed to save image")]
    StorageWrite(#[source] std::io::Error),

    #[error("failed to read image {path}")]
    StorageRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("user with email {0} already exists")]
    EmailTaken(String),

    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Json(#[from] JsonRejection),

    #[error(transparent)]
    MultipartRejection(#[from] MultipartRejection),

    #[error("error parsing form data: {0}")]
    Multipart(#[from] MultipartError),

    #[error("SQL request failed: {0}")]
    Sql(#[from] SQLxError),

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("invalid 'Authorization' header")]
    Unauthorized,
}

impl ServerError {
    /// Shorthand for a missing resource.
    pub fn not_found(resource: impl Into<String>) -> Self {
        ServerError::NotFound {
            resource: resource.into(),
        }
    }
}

impl From<CryptoError> for ServerError {
    fn from(err: CryptoError) -> Self {
        ServerError::Internal {
            details: "password hashing failed".into(),
            source: Some(Box::new(err)),
        }
    }
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    instance: Option<String>,
    errors: Option<Vec<FieldError>>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(parse_validation_errors(errors));
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(
        self,
    ) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/problem+json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            instance: None,
            errors: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| issue.code.to_string()),
            })
        })
        .collect()
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = ResponseError::default()
            .title("There were validation errors with your request.")
            .details(&self.to_string())
            .status(StatusCode::BAD_REQUEST);

        let response = match &self {
            ServerError::NotFound { .. } => response
                .title("Resource not found.")
                .status(StatusCode::NOT_FOUND),

            ServerError::Forbidden { .. } => response
                .title("Operation not permitted.")
                .status(StatusCode::FORBIDDEN),

            ServerError::Conflict { .. } => response
                .title("Concurrent modification.")
                .status(StatusCode::CONFLICT),

            ServerError::InvalidAsset(_) => {
                response.title("Uploaded image is not acceptable.")
            },

            ServerError::InvalidCurrentPassword => {
                response.title("Password change refused.")
            },

            ServerError::Validation(validation_errors) => {
                response.errors(validation_errors)
            },

            ServerError::Json(_)
            | ServerError::MultipartRejection(_)
            | ServerError::Multipart(_) => {
                response.title("Server error during data parsing.")
            },

            ServerError::Unauthorized => response
                .title("Missing or invalid 'Authorization' header.")
                .status(StatusCode::UNAUTHORIZED),

            ServerError::StorageWrite(err) => {
                tracing::error!(error = %err, "image could not be written");
                ResponseError::default().details(&self.to_string())
            },

            ServerError::StorageRead { path, source } => {
                tracing::error!(%path, error = %source, "image could not be read");
                ResponseError::default().details(&self.to_string())
            },

            ServerError::Sql(err) => {
                tracing::error!(error = %err, "record store request failed");
                ResponseError::default()
            },

            ServerError::Internal { details, source } => {
                tracing::error!(err = ?source, %details, "server returned 500 status");
                ResponseError::default()
            },

            ServerError::EmailTaken(_) => response,
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/problem+json")
        .body(
            serde_json::json!({
                "type": null,
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "detail": null,
                "instance": null,
                "errors": null,
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}
