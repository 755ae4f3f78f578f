use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use super::model::{PasswordReset, User};

/// Row shape of the `users` table.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub photo: Option<String>,
    pub role: String,
    pub password_hash: String,
    pub password_changed_at: Option<OffsetDateTime>,
    pub password_reset_token: Option<String>,
    pub password_reset_expires: Option<OffsetDateTime>,
    pub active: bool,
    pub created_at: OffsetDateTime,
}

pub const USER_COLUMNS: &str = "id, name, email, photo, role, password_hash, \
    password_changed_at, password_reset_token, password_reset_expires, active, created_at";

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        let password_reset = match (r.password_reset_token, r.password_reset_expires) {
            (Some(token_hash), Some(expires_at)) => Some(PasswordReset {
                token_hash,
                expires_at,
            }),
            _ => None,
        };
        Ok(Self {
            id: r.id,
            name: r.name,
            email: r.email,
            photo: r.photo,
            role: r.role.parse()?,
            password_hash: r.password_hash,
            password_changed_at: r.password_changed_at,
            password_reset,
            active: r.active,
            created_at: r.created_at,
        })
    }
}
