use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::extractors::{BearerToken, CurrentUser, JsonBody};
use crate::posts::Identity;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
}

impl From<Identity> for UserResponse {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.user_id,
            username: identity.username,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: UserResponse,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
}

async fn login(
    State(state): State<AppState>,
    JsonBody(form): JsonBody<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let login = state
        .sessions
        .login(&form.username, &form.password)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Unauthenticated(_) => {
                AppError::Unauthenticated("Incorrect username or password".into())
            }
            other => other,
        })?;

    Ok(Json(LoginResponse {
        access_token: login.token,
        token_type: "bearer".to_string(),
        user: login.identity.into(),
    }))
}

async fn logout(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> AppResult<StatusCode> {
    if !state.sessions.logout(&token).await? {
        return Err(AppError::Unauthenticated("Invalid token".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn me(CurrentUser(identity): CurrentUser) -> Json<UserResponse> {
    Json(identity.into())
}
