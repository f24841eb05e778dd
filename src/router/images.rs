//! Public image retrieval.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::asset::Asset;
use crate::{AppState, ServerError};

/// Raw bytes under their detected content type.
pub(crate) fn respond(asset: Asset) -> Response {
    ([(header::CONTENT_TYPE, asset.content_type)], asset.bytes).into_response()
}

/// `GET /ads-images/{filename}`.
pub async fn ad_image(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ServerError> {
    state.ads.load_image(&filename).await.map(respond)
}

/// `GET /avatars/{filename}`.
pub async fn avatar(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ServerError> {
    state.accounts.load_avatar(&filename).await.map(respond)
}
