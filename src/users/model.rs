use std::{fmt, str::FromStr};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{
    auth::password::Passwords,
    error::{AppError, AppResult},
};

pub const MIN_PASSWORD_LEN: usize = 8;

pub const ADMIN_ONLY: &[Role] = &[Role::Admin];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    #[default]
    User,
    Guide,
    LeadGuide,
    Admin,
}

impl Role {
    /// Parses a role named in a request body.
    pub fn parse(raw: &str) -> AppResult<Self> {
        raw.parse()
            .map_err(|_| AppError::validation(format!("unknown role: {raw}")))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Guide => "guide",
            Role::LeadGuide => "lead-guide",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "guide" => Ok(Role::Guide),
            "lead-guide" => Ok(Role::LeadGuide),
            "admin" => Ok(Role::Admin),
            other => anyhow::bail!("unknown role {other:?}"),
        }
    }
}

/// A pending password reset. Digest and expiry only exist together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordReset {
    pub token_hash: String,
    pub expires_at: OffsetDateTime,
}

/// User record. Secrets and bookkeeping fields are never serialized.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub photo: Option<String>,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub password_changed_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub password_reset: Option<PasswordReset>,
    #[serde(skip_serializing)]
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl User {
    /// True when the password changed at or after `issued_at` (unix seconds),
    /// i.e. a credential issued at that instant is stale.
    pub fn changed_password_after(&self, issued_at: i64) -> bool {
        self.password_changed_at
            .is_some_and(|changed| changed.unix_timestamp() >= issued_at)
    }
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn parse_email(raw: Option<String>) -> AppResult<String> {
    let email = normalize_email(raw.as_deref().unwrap_or_default());
    if email.is_empty() {
        return Err(AppError::validation("please provide your email"));
    }
    if !is_valid_email(&email) {
        return Err(AppError::validation("please provide a valid email"));
    }
    Ok(email)
}

/// Signup payload as received.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirm: Option<String>,
}

/// A validated, hashed user ready to be persisted. The confirmation is gone.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

impl NewUser {
    pub fn parse(candidate: Registration, passwords: &Passwords) -> AppResult<Self> {
        let name = candidate.name.unwrap_or_default().trim().to_string();
        if name.is_empty() {
            return Err(AppError::validation("please tell us your name"));
        }
        let email = parse_email(candidate.email)?;
        let password_hash = hash_confirmed(
            candidate.password.as_deref(),
            candidate.password_confirm.as_deref(),
            passwords,
        )?;
        Ok(Self {
            name,
            email,
            password_hash,
            role: Role::User,
        })
    }

    pub fn with_role(self, role: Role) -> Self {
        Self { role, ..self }
    }
}

/// A validated replacement password.
#[derive(Debug, Clone)]
pub struct PasswordChange {
    pub password_hash: String,
    pub changed_at: OffsetDateTime,
}

impl PasswordChange {
    pub fn parse(
        password: Option<&str>,
        confirm: Option<&str>,
        passwords: &Passwords,
        now: OffsetDateTime,
    ) -> AppResult<Self> {
        let password_hash = hash_confirmed(password, confirm, passwords)?;
        Ok(Self {
            password_hash,
            // one second back so a token issued right after the change is not stale
            changed_at: now - Duration::seconds(1),
        })
    }
}

fn hash_confirmed(
    password: Option<&str>,
    confirm: Option<&str>,
    passwords: &Passwords,
) -> AppResult<String> {
    let password = password.unwrap_or_default();
    if password.is_empty() {
        return Err(AppError::validation("please provide a password"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    match confirm {
        None | Some("") => return Err(AppError::validation("please confirm your password")),
        Some(c) if c != password => return Err(AppError::validation("passwords do not match")),
        Some(_) => {}
    }
    passwords.hash(password)
}

/// Self-service profile edit. Role is not editable through this path.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl ProfileUpdate {
    pub fn parse(name: Option<String>, email: Option<String>) -> AppResult<Self> {
        let name = match name.map(|n| n.trim().to_string()) {
            Some(n) if n.is_empty() => {
                return Err(AppError::validation("please tell us your name"));
            }
            other => other,
        };
        let email = match email {
            Some(e) => Some(parse_email(Some(e))?),
            None => None,
        };
        Ok(Self { name, email })
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none()
    }
}
