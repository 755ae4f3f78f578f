use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    model::{NewUser, PasswordChange, PasswordReset, ProfileUpdate, Role, User},
    repo::{email_taken, UserStore},
};
use crate::error::{AppError, AppResult};

/// In-memory `UserStore` for tests.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
}

impl MemoryUserStore {
    /// Raw record regardless of `active`, for assertions.
    pub fn snapshot(&self, id: Uuid) -> Option<User> {
        self.users.lock().unwrap().iter().find(|u| u.id == id).cloned()
    }

    fn update<F>(&self, id: Uuid, f: F) -> AppResult<User>
    where
        F: FnOnce(&mut User),
    {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == id && u.active)
            .ok_or_else(|| AppError::not_found("user not found"))?;
        f(user);
        Ok(user.clone())
    }
}

fn reset_matches(user: &User, token_hash: &str, now: OffsetDateTime) -> bool {
    user.password_reset
        .as_ref()
        .is_some_and(|r| r.token_hash == token_hash && r.expires_at > now)
}

fn apply_change(user: &mut User, change: PasswordChange) {
    user.password_hash = change.password_hash;
    user.password_changed_at = Some(change.changed_at);
    user.password_reset = None;
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.active && u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.active && u.id == id).cloned())
    }

    async fn list(&self) -> AppResult<Vec<User>> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().filter(|u| u.active).cloned().collect())
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> AppResult<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users
            .iter()
            .find(|u| u.active && reset_matches(u, token_hash, now))
            .cloned())
    }

    async fn create(&self, new_user: NewUser) -> AppResult<User> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == new_user.email) {
            return Err(email_taken());
        }
        let user = User {
            id: Uuid::new_v4(),
            name: new_user.name,
            email: new_user.email,
            photo: None,
            role: new_user.role,
            password_hash: new_user.password_hash,
            password_changed_at: None,
            password_reset: None,
            active: true,
            created_at: OffsetDateTime::now_utc(),
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn set_password(&self, id: Uuid, change: PasswordChange) -> AppResult<User> {
        self.update(id, |u| apply_change(u, change))
    }

    async fn set_password_reset(&self, id: Uuid, reset: Option<PasswordReset>) -> AppResult<()> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.iter_mut().find(|u| u.id == id) {
            user.password_reset = reset;
        }
        Ok(())
    }

    async fn redeem_password_reset(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
        change: PasswordChange,
    ) -> AppResult<Option<User>> {
        let mut users = self.users.lock().unwrap();
        let found = users
            .iter_mut()
            .find(|u| u.active && reset_matches(u, token_hash, now));
        Ok(found.map(|user| {
            apply_change(user, change);
            user.clone()
        }))
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> AppResult<User> {
        if let Some(email) = &update.email {
            let users = self.users.lock().unwrap();
            if users.iter().any(|u| u.id != id && &u.email == email) {
                return Err(email_taken());
            }
        }
        self.update(id, |u| {
            if let Some(name) = update.name {
                u.name = name;
            }
            if let Some(email) = update.email {
                u.email = email;
            }
        })
    }

    async fn set_role(&self, id: Uuid, role: Role) -> AppResult<User> {
        self.update(id, |u| u.role = role)
    }

    async fn deactivate(&self, id: Uuid) -> AppResult<()> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.iter_mut().find(|u| u.id == id) {
            user.active = false;
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let mut users = self.users.lock().unwrap();
        let before = users.len();
        users.retain(|u| u.id != id);
        Ok(users.len() < before)
    }
}
