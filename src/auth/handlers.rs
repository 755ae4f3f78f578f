use axum::{
    extract::{FromRef, Path, State},
    http::{header::HOST, HeaderMap, StatusCode},
    routing::{patch, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            ForgotPasswordRequest, LoginRequest, MessageData, ResetPasswordRequest,
            UpdatePasswordRequest, UserData,
        },
        extractors::AuthUser,
        services::{AuthService, Session},
    },
    error::AppResult,
    response::Envelope,
    state::AppState,
    users::model::Registration,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/users/signup", post(signup))
        .route("/users/login", post(login))
        .route("/users/forgotPassword", post(forgot_password))
        .route("/users/resetPassword/:token", patch(reset_password))
        .route("/users/updateMyPassword", patch(update_password))
}

fn session_body(session: Session) -> Json<Envelope<UserData>> {
    Json(Envelope::success(UserData { user: session.user }).with_token(session.token))
}

/// `<scheme>://<host>` of the deployment, for links sent by mail.
fn link_base(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(url) = &state.config.public_url {
        return url.clone();
    }
    let host = headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("http");
    format!("{scheme}://{host}")
}

#[instrument(skip(auth, payload))]
pub async fn signup(
    State(auth): State<AuthService>,
    Json(payload): Json<Registration>,
) -> AppResult<(StatusCode, Json<Envelope<UserData>>)> {
    let session = auth.register(payload).await?;
    Ok((StatusCode::CREATED, session_body(session)))
}

#[instrument(skip(auth, payload))]
pub async fn login(
    State(auth): State<AuthService>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<Envelope<UserData>>> {
    let session = auth.authenticate(&payload.email, &payload.password).await?;
    Ok(session_body(session))
}

#[instrument(skip(state, headers, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ForgotPasswordRequest>,
) -> AppResult<Json<Envelope<MessageData>>> {
    let auth = AuthService::from_ref(&state);
    auth.request_password_reset(&payload.email, &link_base(&state, &headers))
        .await?;
    Ok(Json(Envelope::success(MessageData {
        message: "token sent to email",
    })))
}

#[instrument(skip(auth, token, payload))]
pub async fn reset_password(
    State(auth): State<AuthService>,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> AppResult<Json<Envelope<UserData>>> {
    let session = auth
        .reset_password(
            &token,
            payload.password.as_deref(),
            payload.password_confirm.as_deref(),
        )
        .await?;
    Ok(session_body(session))
}

#[instrument(skip(auth, user, payload), fields(user_id = %user.0.id))]
pub async fn update_password(
    State(auth): State<AuthService>,
    user: AuthUser,
    Json(payload): Json<UpdatePasswordRequest>,
) -> AppResult<Json<Envelope<UserData>>> {
    let session = auth
        .update_password(
            &user.0,
            &payload.password_current,
            payload.password.as_deref(),
            payload.password_confirm.as_deref(),
        )
        .await?;
    Ok(session_body(session))
}
