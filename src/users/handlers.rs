use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, patch},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use super::model::{NewUser, ProfileUpdate, Registration, Role, User};
use crate::{
    auth::{dto::UserData, AuthUser},
    error::{AppError, AppResult},
    response::Envelope,
    state::AppState,
};

const NOT_FOR_PASSWORDS: &str = "this route is not for password updates, please use /updateMyPassword";

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(get_me))
        .route("/users/updateMe", patch(update_me))
        .route("/users/deleteMe", delete(delete_me))
}

/// User management. The caller wraps these in the admin gate.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).patch(update_user).delete(delete_user),
        )
}

/// Body of `PATCH /users/updateMe`. Anything besides name and email is ignored;
/// password fields are refused outright.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirm: Option<String>,
}

#[instrument(skip(user), fields(user_id = %user.0.id))]
pub async fn get_me(user: AuthUser) -> AppResult<Json<Envelope<UserData>>> {
    Ok(Json(Envelope::success(UserData { user: user.0 })))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.0.id))]
pub async fn update_me(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpdateMeRequest>,
) -> AppResult<Json<Envelope<UserData>>> {
    if payload.password.is_some() || payload.password_confirm.is_some() {
        return Err(AppError::validation(NOT_FOR_PASSWORDS));
    }
    let update = ProfileUpdate::parse(payload.name, payload.email)?;
    if update.is_empty() {
        return Ok(Json(Envelope::success(UserData { user: user.0 })));
    }
    let updated = state.users.update_profile(user.0.id, update).await?;
    info!(user_id = %updated.id, "profile updated");
    Ok(Json(Envelope::success(UserData { user: updated })))
}

#[instrument(skip(state, user), fields(user_id = %user.0.id))]
pub async fn delete_me(State(state): State<AppState>, user: AuthUser) -> AppResult<StatusCode> {
    state.users.deactivate(user.0.id).await?;
    info!(user_id = %user.0.id, "account deactivated");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct UsersData {
    pub users: Vec<User>,
}

/// Body of `POST /users`: a signup plus an optional role.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(flatten)]
    pub registration: Registration,
    pub role: Option<String>,
}

/// Body of `PATCH /users/:id`. Passwords stay with their owner.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub password: Option<String>,
    pub password_confirm: Option<String>,
}

fn user_not_found(raw_id: &str) -> AppError {
    AppError::not_found(format!("no user found with id: {raw_id}"))
}

fn user_id(raw_id: &str) -> AppResult<Uuid> {
    raw_id.parse().map_err(|_| user_not_found(raw_id))
}

#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Envelope<UsersData>>> {
    let users = state.users.list().await?;
    let results = users.len();
    Ok(Json(Envelope::success(UsersData { users }).with_results(results)))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<Json<Envelope<UserData>>> {
    let user = state
        .users
        .find_by_id(user_id(&raw_id)?)
        .await?
        .ok_or_else(|| user_not_found(&raw_id))?;
    Ok(Json(Envelope::success(UserData { user })))
}

#[instrument(skip(state, admin, payload), fields(admin_id = %admin.0.id))]
pub async fn create_user(
    State(state): State<AppState>,
    admin: AuthUser,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<Envelope<UserData>>)> {
    let role = match payload.role.as_deref() {
        Some(raw) => Role::parse(raw)?,
        None => Role::User,
    };
    let new_user = NewUser::parse(payload.registration, &state.passwords)?.with_role(role);
    let user = state.users.create(new_user).await?;
    info!(user_id = %user.id, role = %user.role, "user created by admin");
    Ok((
        StatusCode::CREATED,
        Json(Envelope::success(UserData { user })),
    ))
}

#[instrument(skip(state, admin, payload), fields(admin_id = %admin.0.id))]
pub async fn update_user(
    State(state): State<AppState>,
    admin: AuthUser,
    Path(raw_id): Path<String>,
    Json(payload): Json<UpdateUserRequest>,
) -> AppResult<Json<Envelope<UserData>>> {
    if payload.password.is_some() || payload.password_confirm.is_some() {
        return Err(AppError::validation(NOT_FOR_PASSWORDS));
    }
    let id = user_id(&raw_id)?;
    let role = payload.role.as_deref().map(Role::parse).transpose()?;
    let update = ProfileUpdate::parse(payload.name, payload.email)?;

    let mut user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| user_not_found(&raw_id))?;
    if !update.is_empty() {
        user = state.users.update_profile(id, update).await?;
    }
    if let Some(role) = role {
        user = state.users.set_role(id, role).await?;
        info!(user_id = %id, role = %role, "role changed");
    }
    Ok(Json(Envelope::success(UserData { user })))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.0.id))]
pub async fn delete_user(
    State(state): State<AppState>,
    admin: AuthUser,
    Path(raw_id): Path<String>,
) -> AppResult<StatusCode> {
    if !state.users.delete(user_id(&raw_id)?).await? {
        return Err(user_not_found(&raw_id));
    }
    info!(user_id = %raw_id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}
