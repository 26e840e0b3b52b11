use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppResult;
use crate::extractors::{CurrentUser, JsonBody};
use crate::posts::PostView;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreatePostRequest {
    pub text: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/{id}", get(get_post).delete(delete_post))
        .route("/posts/{id}/like", post(like_post).delete(unlike_post))
        .route("/users/{username}/posts", get(list_user_posts))
}

async fn list_posts(
    State(state): State<AppState>,
    CurrentUser(viewer): CurrentUser,
) -> AppResult<Json<Vec<PostView>>> {
    Ok(Json(state.posts.list_posts(&viewer).await?))
}

async fn create_post(
    State(state): State<AppState>,
    CurrentUser(owner): CurrentUser,
    JsonBody(form): JsonBody<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<PostView>)> {
    let post = state.posts.create_post(&owner, &form.text).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn get_post(
    State(state): State<AppState>,
    CurrentUser(viewer): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<PostView>> {
    Ok(Json(state.posts.get_post(&viewer, &id).await?))
}

async fn delete_post(
    State(state): State<AppState>,
    CurrentUser(requester): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.posts.delete_post(&requester, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn like_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<(StatusCode, Json<Value>)> {
    state.posts.like_post(&user, &id).await?;
    Ok((StatusCode::CREATED, Json(json!({ "detail": "Liked" }))))
}

async fn unlike_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.posts.unlike_post(&user, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_user_posts(
    State(state): State<AppState>,
    CurrentUser(viewer): CurrentUser,
    Path(username): Path<String>,
) -> AppResult<Json<Vec<PostView>>> {
    Ok(Json(state.posts.list_posts_by_user(&viewer, &username).await?))
}
