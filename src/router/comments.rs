//! Comments HTTP API, nested under `/ads/{id}/comments`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::ad::AdId;
use crate::asset::AssetReference;
use crate::comment::{CommentDetails, CommentId};
use crate::identity::{Identity, IdentityId};
use crate::router::{Page, Valid};
use crate::{AppState, ServerError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    author: IdentityId,
    author_image: Option<AssetReference>,
    author_first_name: String,
    /// Milliseconds since the Unix epoch.
    created_at: i64,
    pk: CommentId,
    text: String,
}

impl From<CommentDetails> for CommentView {
    fn from(details: CommentDetails) -> Self {
        Self {
            author: details.comment.author,
            author_image: details.author_image,
            author_first_name: details.author_first_name,
            created_at: details.comment.created_at.timestamp_millis(),
            pk: details.comment.id,
            text: details.comment.text,
        }
    }
}

#[derive(Debug, validator::Validate, Serialize, Deserialize)]
pub struct Body {
    #[validate(length(min = 8, max = 64, message = "Comment must be 8 to 64 characters long."))]
    text: String,
}

pub async fn list(
    State(state): State<AppState>,
    Path(ad): Path<i32>,
) -> Result<Json<Page<CommentView>>, ServerError> {
    let comments = state.comments.list(AdId(ad)).await?;
    Ok(Json(Page::new(
        comments.into_iter().map(CommentView::from).collect(),
    )))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(ad): Path<i32>,
    Valid(body): Valid<Body>,
) -> Result<Json<CommentView>, ServerError> {
    let comment = state.comments.create(AdId(ad), &identity, body.text).await?;
    Ok(Json(comment.into()))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((ad, id)): Path<(i32, i32)>,
    Valid(body): Valid<Body>,
) -> Result<Json<CommentView>, ServerError> {
    let comment = state
        .comments
        .update(AdId(ad), CommentId(id), &identity, body.text)
        .await?;
    Ok(Json(comment.into()))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((ad, id)): Path<(i32, i32)>,
) -> Result<StatusCode, ServerError> {
    state
        .comments
        .delete(AdId(ad), CommentId(id), &identity)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
