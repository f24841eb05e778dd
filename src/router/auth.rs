//! Registration and credential probe.

use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;

use crate::account::Registration;
use crate::identity::Role;
use crate::router::{Valid, validate_phone};
use crate::{AppState, ServerError};

#[derive(validator::Validate, Deserialize)]
pub struct LoginBody {
    #[validate(length(min = 4, max = 32, message = "Login must be 4 to 32 characters long."))]
    username: String,
    #[validate(length(min = 8, max = 16, message = "Password must be 8 to 16 characters long."))]
    password: String,
}

#[derive(validator::Validate, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBody {
    #[validate(length(min = 4, max = 32, message = "Login must be 4 to 32 characters long."))]
    username: String,
    #[validate(length(min = 8, max = 16, message = "Password must be 8 to 16 characters long."))]
    password: String,
    #[validate(length(min = 2, max = 16, message = "First name must be 2 to 16 characters long."))]
    first_name: String,
    #[validate(length(min = 2, max = 16, message = "Last name must be 2 to 16 characters long."))]
    last_name: String,
    #[validate(custom(function = "validate_phone"))]
    phone: String,
    #[serde(default)]
    role: Role,
}

/// `POST /login`: 200 when the credentials resolve to an identity.
pub async fn login(
    State(state): State<AppState>,
    Valid(body): Valid<LoginBody>,
) -> Result<StatusCode, ServerError> {
    state
        .accounts
        .authenticate(&body.username, &body.password)
        .await?;
    Ok(StatusCode::OK)
}

/// `POST /register`.
pub async fn register(
    State(state): State<AppState>,
    Valid(body): Valid<RegisterBody>,
) -> Result<StatusCode, ServerError> {
    state
        .accounts
        .register(Registration {
            email: body.username,
            password: body.password,
            first_name: body.first_name,
            last_name: body.last_name,
            phone: body.phone,
            role: body.role,
        })
        .await?;
    Ok(StatusCode::CREATED)
}
