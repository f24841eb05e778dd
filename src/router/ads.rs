//! Ads HTTP API.

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, patch, post};
use axum::{Extension, Json, Router, middleware};
use serde::{Deserialize, Serialize};

use crate::ad::{Ad, AdChanges, AdDetails, AdFields, AdId, MAX_PRICE};
use crate::asset::AssetReference;
use crate::identity::{Identity, IdentityId};
use crate::router::{Page, Upload, Valid, authenticate, comments, images};
use crate::{AppState, ServerError};

#[derive(Debug, Serialize)]
pub struct AdView {
    author: IdentityId,
    image: Option<AssetReference>,
    pk: AdId,
    price: i32,
    title: String,
}

impl From<Ad> for AdView {
    fn from(ad: Ad) -> Self {
        Self {
            author: ad.owner,
            image: ad.image,
            pk: ad.id,
            price: ad.price,
            title: ad.title,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedAdView {
    pk: AdId,
    author_first_name: String,
    author_last_name: String,
    description: String,
    email: String,
    image: Option<AssetReference>,
    phone: String,
    price: i32,
    title: String,
}

impl From<AdDetails> for ExtendedAdView {
    fn from(details: AdDetails) -> Self {
        Self {
            pk: details.ad.id,
            author_first_name: details.author_first_name,
            author_last_name: details.author_last_name,
            description: details.ad.description,
            email: details.email,
            image: details.ad.image,
            phone: details.phone,
            price: details.ad.price,
            title: details.ad.title,
        }
    }
}

#[derive(Debug, validator::Validate, Serialize, Deserialize)]
pub struct CreateBody {
    #[validate(length(min = 4, max = 32, message = "Title must be 4 to 32 characters long."))]
    title: String,
    #[validate(length(
        min = 8,
        max = 64,
        message = "Description must be 8 to 64 characters long."
    ))]
    description: String,
    #[validate(range(min = 0, max = MAX_PRICE, message = "Price must be between 0 and 10000000."))]
    price: i32,
}

#[derive(Debug, validator::Validate, Serialize, Deserialize)]
pub struct UpdateBody {
    #[validate(length(min = 4, max = 32, message = "Title must be 4 to 32 characters long."))]
    title: Option<String>,
    #[validate(length(
        min = 8,
        max = 64,
        message = "Description must be 8 to 64 characters long."
    ))]
    description: Option<String>,
    #[validate(range(min = 0, max = MAX_PRICE, message = "Price must be between 0 and 10000000."))]
    price: Option<i32>,
}

async fn list(State(state): State<AppState>) -> Result<Json<Page<AdView>>, ServerError> {
    let ads = state.ads.list().await?;
    Ok(Json(Page::new(ads.into_iter().map(AdView::from).collect())))
}

async fn mine(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Page<AdView>>, ServerError> {
    let ads = state.ads.list_by_owner(&identity).await?;
    Ok(Json(Page::new(ads.into_iter().map(AdView::from).collect())))
}

async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ExtendedAdView>, ServerError> {
    let details = state.ads.get(AdId(id)).await?;
    Ok(Json(details.into()))
}

async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<AdView>), ServerError> {
    let upload = Upload::read(multipart?).await?;
    let body: CreateBody = upload.properties()?;

    let fields = AdFields {
        title: body.title,
        description: body.description,
        price: body.price,
    };
    let ad = state.ads.create(&identity, fields, upload.image).await?;

    Ok((StatusCode::CREATED, Json(ad.into())))
}

async fn update(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i32>,
    Valid(body): Valid<UpdateBody>,
) -> Result<Json<AdView>, ServerError> {
    let changes = AdChanges {
        title: body.title,
        description: body.description,
        price: body.price,
    };
    let ad = state.ads.update(AdId(id), &identity, changes).await?;

    Ok(Json(ad.into()))
}

async fn remove(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i32>,
) -> Result<StatusCode, ServerError> {
    state.ads.delete(AdId(id), &identity).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Responds with the freshly stored image.
async fn replace_image(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i32>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ServerError> {
    let upload = Upload::read(multipart?).await?;
    let ad = state.ads.replace_image(AdId(id), &identity, upload.image).await?;

    let reference = ad
        .image
        .ok_or_else(|| ServerError::not_found(format!("image of ad {id}")))?;
    state
        .ads
        .load_image(reference.as_str())
        .await
        .map(images::respond)
}

pub fn router(state: AppState) -> Router<AppState> {
    let upload_limit = DefaultBodyLimit::max(super::upload_limit(&state));

    let protected = Router::new()
        // `POST /ads` goes to `create`. Multipart.
        .route("/", post(create).layer(upload_limit))
        .route("/me", get(mine))
        .route("/{id}", patch(update).delete(remove))
        .route("/{id}/image", patch(replace_image).layer(upload_limit))
        .route("/{id}/comments", post(comments::create))
        .route(
            "/{id}/comments/{comment_id}",
            patch(comments::update).delete(comments::remove),
        )
        .route_layer(middleware::from_fn_with_state(state, authenticate));

    Router::new()
        // `GET /ads` goes to `list`.
        .route("/", get(list))
        .route("/{id}", get(get_one))
        .route("/{id}/comments", get(comments::list))
        .merge(protected)
}
