use std::sync::Arc;

use axum::extract::FromRef;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    jwt::JwtKeys,
    password::{generate_reset_token, reset_token_digest, Passwords},
};
use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    mailer::{Mailer, Message},
    state::AppState,
    users::{
        model::{normalize_email, NewUser, PasswordChange, Registration, Role, User},
        repo::UserStore,
    },
};

pub const NOT_LOGGED_IN: &str = "you are not logged in, please log in to get access";
pub const INVALID_TOKEN: &str = "invalid or expired token, please log in again";
pub const USER_GONE: &str = "the user belonging to this token no longer exists";
pub const STALE_TOKEN: &str = "user recently changed password, please log in again";
pub const BAD_CREDENTIALS: &str = "incorrect email or password";
pub const NO_PERMISSION: &str = "you do not have permission to perform this action";
pub const RESET_INVALID: &str = "token is invalid or has expired";
pub const WRONG_CURRENT_PASSWORD: &str = "your current password is incorrect";

/// A user together with a freshly issued credential.
#[derive(Debug)]
pub struct Session {
    pub user: User,
    pub token: String,
}

/// Authentication and password lifecycle.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
    keys: JwtKeys,
    passwords: Passwords,
    clock: Arc<dyn Clock>,
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        Self {
            users: state.users.clone(),
            mailer: state.mailer.clone(),
            keys: state.keys.clone(),
            passwords: state.passwords.clone(),
            clock: state.clock.clone(),
        }
    }
}

/// Fails unless `user` holds one of `allowed`.
pub fn authorize(user: &User, allowed: &[Role]) -> AppResult<()> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        warn!(user_id = %user.id, role = %user.role, "role not allowed");
        Err(AppError::authorization(NO_PERMISSION))
    }
}

impl AuthService {
    pub fn issue_credential(&self, user_id: Uuid) -> AppResult<String> {
        Ok(self.keys.sign(user_id, self.clock.now())?)
    }

    fn session(&self, user: User) -> AppResult<Session> {
        let token = self.issue_credential(user.id)?;
        Ok(Session { user, token })
    }

    pub async fn register(&self, candidate: Registration) -> AppResult<Session> {
        let new_user = NewUser::parse(candidate, &self.passwords)?;
        let user = self.users.create(new_user).await?;
        info!(user_id = %user.id, email = %user.email, "user registered");
        self.session(user)
    }

    pub async fn authenticate(&self, email: &str, password: &str) -> AppResult<Session> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AppError::validation("please provide email and password"));
        }

        let user = self.users.find_by_email(&email).await?;
        let matched = match &user {
            Some(u) => self.passwords.verify(password, &u.password_hash)?,
            None => {
                self.passwords.verify_dummy(password);
                false
            }
        };

        match user {
            Some(user) if matched => {
                info!(user_id = %user.id, "user logged in");
                self.session(user)
            }
            _ => {
                warn!("login rejected");
                Err(AppError::authentication(BAD_CREDENTIALS))
            }
        }
    }

    /// Resolves a bearer token to a live user. Reads only.
    pub async fn verify(&self, token: Option<&str>) -> AppResult<User> {
        let token = token.ok_or_else(|| AppError::authentication(NOT_LOGGED_IN))?;

        let claims = self
            .keys
            .verify(token, self.clock.now())
            .map_err(|e| {
                warn!(error = %e, "token rejected");
                AppError::authentication(INVALID_TOKEN)
            })?;

        let user = self
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or_else(|| AppError::authentication(USER_GONE))?;

        if user.changed_password_after(claims.iat) {
            warn!(user_id = %user.id, "token predates password change");
            return Err(AppError::authentication(STALE_TOKEN));
        }

        Ok(user)
    }

    /// Emails a one-time reset link under `link_base`. The stored digest is
    /// rolled back when the mail cannot be delivered.
    pub async fn request_password_reset(&self, email: &str, link_base: &str) -> AppResult<()> {
        let email = normalize_email(email);
        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or_else(|| AppError::not_found("there is no user with that email address"))?;

        let (raw, reset) = generate_reset_token(self.clock.now());
        self.users.set_password_reset(user.id, Some(reset)).await?;

        let url = format!("{link_base}/api/v1/users/resetPassword/{raw}");
        let message = Message {
            to: user.email.clone(),
            subject: "Your password reset token (valid for 10 minutes)".into(),
            body: format!(
                "Forgot your password? Submit a PATCH request with your new password and \
                 passwordConfirm to: {url}\nIf you didn't forget your password, please ignore this email."
            ),
        };

        if let Err(e) = self.mailer.send(message).await {
            error!(error = %e, user_id = %user.id, "reset mail not delivered, clearing token");
            self.users.set_password_reset(user.id, None).await?;
            return Err(AppError::Delivery(
                "there was an error sending the email, try again later".into(),
            ));
        }

        info!(user_id = %user.id, "password reset requested");
        Ok(())
    }

    pub async fn reset_password(
        &self,
        raw_token: &str,
        password: Option<&str>,
        confirm: Option<&str>,
    ) -> AppResult<Session> {
        let now = self.clock.now();
        let digest = reset_token_digest(raw_token);
        if self.users.find_by_reset_token(&digest, now).await?.is_none() {
            return Err(AppError::validation(RESET_INVALID));
        }
        let change = PasswordChange::parse(password, confirm, &self.passwords, now)?;
        // redemption is still conditional: a concurrent reset may have won
        let user = self
            .users
            .redeem_password_reset(&digest, now, change)
            .await?
            .ok_or_else(|| AppError::validation(RESET_INVALID))?;
        info!(user_id = %user.id, "password reset");
        self.session(user)
    }

    pub async fn update_password(
        &self,
        user: &User,
        current: &str,
        password: Option<&str>,
        confirm: Option<&str>,
    ) -> AppResult<Session> {
        let record = self
            .users
            .find_by_id(user.id)
            .await?
            .ok_or_else(|| AppError::authentication(USER_GONE))?;

        if !self.passwords.verify(current, &record.password_hash)? {
            warn!(user_id = %record.id, "current password mismatch");
            return Err(AppError::authorization(WRONG_CURRENT_PASSWORD));
        }

        let change = PasswordChange::parse(password, confirm, &self.passwords, self.clock.now())?;
        let user = self.users.set_password(record.id, change).await?;
        info!(user_id = %user.id, "password updated");
        self.session(user)
    }
}
