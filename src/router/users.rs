//! Users-related HTTP API.

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Extension, Json, Router, middleware};
use serde::{Deserialize, Serialize};

use crate::asset::AssetReference;
use crate::identity::{Identity, IdentityId, ProfileChanges, Role};
use crate::router::{Upload, Valid, authenticate, validate_phone};
use crate::{AppState, ServerError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    id: IdentityId,
    email: String,
    first_name: String,
    last_name: String,
    phone: String,
    role: Role,
    image: Option<AssetReference>,
}

impl From<Identity> for UserView {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id,
            email: identity.email,
            first_name: identity.first_name,
            last_name: identity.last_name,
            phone: identity.phone,
            role: identity.role,
            image: identity.avatar,
        }
    }
}

#[derive(Debug, validator::Validate, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBody {
    #[validate(length(min = 2, max = 16, message = "First name must be 2 to 16 characters long."))]
    first_name: Option<String>,
    #[validate(length(min = 2, max = 16, message = "Last name must be 2 to 16 characters long."))]
    last_name: Option<String>,
    #[validate(custom(function = "validate_phone"))]
    phone: Option<String>,
}

#[derive(validator::Validate, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordBody {
    #[validate(length(min = 8, max = 16, message = "Password must be 8 to 16 characters long."))]
    current_password: String,
    #[validate(length(min = 8, max = 16, message = "Password must be 8 to 16 characters long."))]
    new_password: String,
}

async fn me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<UserView>, ServerError> {
    let identity = state.accounts.get_profile(&identity).await?;
    Ok(Json(identity.into()))
}

async fn update(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Valid(body): Valid<UpdateBody>,
) -> Result<Json<UserView>, ServerError> {
    let changes = ProfileChanges {
        first_name: body.first_name,
        last_name: body.last_name,
        phone: body.phone,
    };
    let identity = state.accounts.update_profile(&identity, changes).await?;

    Ok(Json(identity.into()))
}

async fn set_password(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Valid(body): Valid<PasswordBody>,
) -> Result<StatusCode, ServerError> {
    state
        .accounts
        .change_password(&identity, &body.current_password, &body.new_password)
        .await?;
    Ok(StatusCode::OK)
}

async fn update_image(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UserView>, ServerError> {
    let upload = Upload::read(multipart?).await?;
    let identity = state.accounts.replace_avatar(&identity, upload.image).await?;

    Ok(Json(identity.into()))
}

pub fn router(state: AppState) -> Router<AppState> {
    let upload_limit = DefaultBodyLimit::max(super::upload_limit(&state));

    Router::new()
        // `GET /users/me` goes to `me`. Authorization required.
        .route("/me", get(me).patch(update))
        .route("/me/image", patch(update_image).layer(upload_limit))
        .route("/set_password", post(set_password))
        .route_layer(middleware::from_fn_with_state(state, authenticate))
}
