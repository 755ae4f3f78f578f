use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    model::{NewUser, PasswordChange, PasswordReset, ProfileUpdate, Role, User},
    repo_types::{UserRow, USER_COLUMNS},
};
use crate::error::{AppError, AppResult};

/// Persistence for user records. Every lookup ignores inactive users.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>>;

    /// Active users, oldest first.
    async fn list(&self) -> AppResult<Vec<User>>;

    /// The user whose pending reset matches `token_hash` and is still
    /// unexpired at `now`.
    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> AppResult<Option<User>>;

    /// Fails with a validation error when the email is already taken.
    async fn create(&self, new_user: NewUser) -> AppResult<User>;

    /// Replaces the password hash, stamps `password_changed_at` and drops any
    /// pending reset.
    async fn set_password(&self, id: Uuid, change: PasswordChange) -> AppResult<User>;

    /// Stores (or with `None` clears) the pending reset digest and expiry.
    async fn set_password_reset(&self, id: Uuid, reset: Option<PasswordReset>) -> AppResult<()>;

    /// Atomically finds the user whose pending reset matches `token_hash` and
    /// expires after `now`, and applies `change`. `None` when nothing matched.
    async fn redeem_password_reset(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
        change: PasswordChange,
    ) -> AppResult<Option<User>>;

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> AppResult<User>;

    async fn set_role(&self, id: Uuid, role: Role) -> AppResult<User>;

    /// Soft delete.
    async fn deactivate(&self, id: Uuid) -> AppResult<()>;

    /// Removes the record for good. `false` when there was none.
    async fn delete(&self, id: Uuid) -> AppResult<bool>;
}

pub(crate) fn email_taken() -> AppError {
    AppError::validation("email is already registered")
}

fn map_unique(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => email_taken(),
        _ => AppError::Database(e),
    }
}

fn into_user(row: UserRow) -> AppResult<User> {
    Ok(User::try_from(row)?)
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn fetch_one_where(&self, clause: &str, bind: &str) -> AppResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {clause} AND active");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(bind)
            .fetch_optional(&self.db)
            .await?;
        row.map(into_user).transpose()
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.fetch_one_where("email = $1", email).await
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND active");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        row.map(into_user).transpose()
    }

    async fn list(&self) -> AppResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE active ORDER BY created_at");
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(&self.db)
            .await?;
        rows.into_iter().map(into_user).collect()
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> AppResult<Option<User>> {
        let sql = format!(
            r#"
            SELECT {USER_COLUMNS}
              FROM users
             WHERE password_reset_token = $1
               AND password_reset_expires > $2
               AND active
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&self.db)
            .await?;
        row.map(into_user).transpose()
    }

    async fn create(&self, new_user: NewUser) -> AppResult<User> {
        let sql = format!(
            r#"
            INSERT INTO users (id, name, email, password_hash, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new_user.name)
            .bind(&new_user.email)
            .bind(&new_user.password_hash)
            .bind(new_user.role.as_str())
            .fetch_one(&self.db)
            .await
            .map_err(map_unique)?;
        into_user(row)
    }

    async fn set_password(&self, id: Uuid, change: PasswordChange) -> AppResult<User> {
        let sql = format!(
            r#"
            UPDATE users
               SET password_hash = $2,
                   password_changed_at = $3,
                   password_reset_token = NULL,
                   password_reset_expires = NULL
             WHERE id = $1 AND active
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(&change.password_hash)
            .bind(change.changed_at)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found("user not found"))?;
        into_user(row)
    }

    async fn set_password_reset(&self, id: Uuid, reset: Option<PasswordReset>) -> AppResult<()> {
        let (token_hash, expires_at) = match reset {
            Some(r) => (Some(r.token_hash), Some(r.expires_at)),
            None => (None, None),
        };
        sqlx::query(
            r#"
            UPDATE users
               SET password_reset_token = $2,
                   password_reset_expires = $3
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn redeem_password_reset(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
        change: PasswordChange,
    ) -> AppResult<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
               SET password_hash = $3,
                   password_changed_at = $4,
                   password_reset_token = NULL,
                   password_reset_expires = NULL
             WHERE password_reset_token = $1
               AND password_reset_expires > $2
               AND active
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(token_hash)
            .bind(now)
            .bind(&change.password_hash)
            .bind(change.changed_at)
            .fetch_optional(&self.db)
            .await?;
        row.map(into_user).transpose()
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> AppResult<User> {
        let sql = format!(
            r#"
            UPDATE users
               SET name = COALESCE($2, name),
                   email = COALESCE($3, email)
             WHERE id = $1 AND active
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(update.name)
            .bind(update.email)
            .fetch_optional(&self.db)
            .await
            .map_err(map_unique)?
            .ok_or_else(|| AppError::not_found("user not found"))?;
        into_user(row)
    }

    async fn set_role(&self, id: Uuid, role: Role) -> AppResult<User> {
        let sql = format!(
            "UPDATE users SET role = $2 WHERE id = $1 AND active RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(role.as_str())
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found("user not found"))?;
        into_user(row)
    }

    async fn deactivate(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE users SET active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
