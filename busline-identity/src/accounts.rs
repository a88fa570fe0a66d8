use std::collections::BTreeSet;
use std::sync::Arc;

use busline_core::models::{
    Admin, NewAdmin, NewUser, Passenger, PassengerDetails, Reservation, User,
};
use busline_core::repository::{is_duplicate, AdminRepository, RepoError, UserRepository};
use busline_core::{AccessToken, CoreError, CoreResult, Role};
use busline_shared::Masked;
use serde::{Deserialize, Serialize};

use crate::hasher::CredentialHasher;
use crate::token::{decode_bearer, TokenCodec};

// ============================================================================
// Requests / responses
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: Masked<String>,
    pub user_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
}

impl Registration {
    /// Rider details, when the candidate registered with a full name.
    fn passenger_details(&self) -> Option<PassengerDetails> {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) if !first.trim().is_empty() && !last.trim().is_empty() => {
                Some(PassengerDetails {
                    first_name: first.clone(),
                    last_name: last.clone(),
                    phone_number: self.phone_number.clone(),
                })
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginOutcome {
    pub token: String,
    pub role: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminCandidate {
    pub user_name: String,
    pub email: String,
    pub password: Masked<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminPatch {
    pub user_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<Masked<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: User,
    pub passenger: Option<Passenger>,
}

/// Registered account removed together with everything it owned.
#[derive(Debug, Clone, Serialize)]
pub struct DeletedAccount {
    pub user: User,
    pub cancelled_reservations: Vec<Reservation>,
}

// ============================================================================
// Service
// ============================================================================

pub struct AccountService {
    users: Arc<dyn UserRepository>,
    admins: Arc<dyn AdminRepository>,
    hasher: Arc<dyn CredentialHasher>,
    tokens: Arc<dyn TokenCodec>,
}

fn require_email(email: &str) -> CoreResult<()> {
    if email.trim().is_empty() || !email.contains('@') {
        return Err(CoreError::Validation(format!("'{}' is not a valid email", email)));
    }
    Ok(())
}

/// A unique-key collision raised by the store means another writer took the
/// email between the lookup and the insert.
fn taken_email(email: &str) -> impl FnOnce(RepoError) -> CoreError + '_ {
    move |err| {
        if is_duplicate(&err) {
            CoreError::DuplicateEmail(email.to_string())
        } else {
            err.into()
        }
    }
}

fn require_password(password: &str) -> CoreResult<()> {
    if password.is_empty() {
        return Err(CoreError::Validation("password must not be empty".into()));
    }
    Ok(())
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        admins: Arc<dyn AdminRepository>,
        hasher: Arc<dyn CredentialHasher>,
        tokens: Arc<dyn TokenCodec>,
    ) -> Self {
        Self {
            users,
            admins,
            hasher,
            tokens,
        }
    }

    pub async fn register(&self, candidate: Registration) -> CoreResult<User> {
        require_email(&candidate.email)?;
        require_password(candidate.password.expose())?;

        if self.users.find_user_by_email(&candidate.email).await?.is_some() {
            return Err(CoreError::DuplicateEmail(candidate.email));
        }

        let passenger = candidate.passenger_details();
        let new_user = NewUser {
            email: candidate.email.clone(),
            password_hash: Masked(self.hasher.hash(candidate.password.expose())?),
            user_name: candidate.user_name.clone(),
            first_name: candidate.first_name.clone(),
            last_name: candidate.last_name.clone(),
            phone_number: candidate.phone_number.clone(),
            roles: BTreeSet::from([Role::User]),
        };
        let user = self
            .users
            .insert_user(new_user, passenger)
            .await
            .map_err(taken_email(&candidate.email))?;
        tracing::info!(user_id = user.id, "registered user");
        Ok(user)
    }

    pub async fn authenticate(&self, email: &str, password: &str) -> CoreResult<LoginOutcome> {
        let user = self
            .users
            .find_user_by_email(email)
            .await?
            .ok_or_else(|| CoreError::UserNotFound(email.to_string()))?;

        if !self.hasher.verify(password, user.password_hash.expose()) {
            tracing::warn!(user_id = user.id, "rejected login");
            return Err(CoreError::InvalidCredentials);
        }

        let token = self.tokens.encode(&user.email, user.id, &user.roles)?;
        Ok(LoginOutcome {
            token,
            role: user.role_names().join(","),
        })
    }

    pub async fn authenticate_admin(&self, email: &str, password: &str) -> CoreResult<LoginOutcome> {
        let admin = self
            .admins
            .find_admin_by_email(email)
            .await?
            .ok_or_else(|| CoreError::AdminNotFound(email.to_string()))?;

        if !self.hasher.verify(password, admin.password_hash.expose()) {
            tracing::warn!(admin_id = admin.id, "rejected admin login");
            return Err(CoreError::InvalidCredentials);
        }

        let roles = BTreeSet::from([Role::Admin]);
        let token = self.tokens.encode(&admin.email, admin.id, &roles)?;
        Ok(LoginOutcome {
            token,
            role: Role::Admin.to_string(),
        })
    }

    pub fn decode(&self, header: &str) -> CoreResult<AccessToken> {
        decode_bearer(self.tokens.as_ref(), header)
    }

    pub async fn create_admin(&self, caller: &AccessToken, candidate: AdminCandidate) -> CoreResult<Admin> {
        caller.require_admin()?;
        self.insert_admin(candidate).await
    }

    async fn insert_admin(&self, candidate: AdminCandidate) -> CoreResult<Admin> {
        require_email(&candidate.email)?;
        require_password(candidate.password.expose())?;
        if self.admins.find_admin_by_email(&candidate.email).await?.is_some() {
            return Err(CoreError::DuplicateEmail(candidate.email));
        }
        let admin = self
            .admins
            .insert_admin(NewAdmin {
                user_name: candidate.user_name,
                email: candidate.email.clone(),
                password_hash: Masked(self.hasher.hash(candidate.password.expose())?),
            })
            .await
            .map_err(taken_email(&candidate.email))?;
        tracing::info!(admin_id = admin.id, "created admin");
        Ok(admin)
    }

    pub async fn update_admin(
        &self,
        caller: &AccessToken,
        admin_id: i64,
        patch: AdminPatch,
    ) -> CoreResult<Admin> {
        caller.authorize_id(admin_id)?;
        let mut admin = self
            .admins
            .find_admin(admin_id)
            .await?
            .ok_or_else(|| CoreError::AdminNotFound(admin_id.to_string()))?;

        if let Some(email) = patch.email {
            if email != admin.email {
                require_email(&email)?;
                if self.admins.find_admin_by_email(&email).await?.is_some() {
                    return Err(CoreError::DuplicateEmail(email));
                }
                admin.email = email;
            }
        }
        if let Some(user_name) = patch.user_name {
            admin.user_name = user_name;
        }
        if let Some(password) = patch.password {
            require_password(password.expose())?;
            admin.password_hash = Masked(self.hasher.hash(password.expose())?);
        }

        let saved = self
            .admins
            .save_admin(&admin)
            .await
            .map_err(taken_email(&admin.email))?;
        if !saved {
            return Err(CoreError::AdminNotFound(admin_id.to_string()));
        }
        Ok(admin)
    }

    /// Create the configured bootstrap admin unless one with that email exists.
    pub async fn ensure_admin(&self, email: &str, password: &str, user_name: &str) -> CoreResult<Admin> {
        if let Some(existing) = self.admins.find_admin_by_email(email).await? {
            return Ok(existing);
        }
        self.insert_admin(AdminCandidate {
            user_name: user_name.to_string(),
            email: email.to_string(),
            password: Masked(password.to_string()),
        })
        .await
    }

    pub async fn user_profile(&self, caller: &AccessToken, email: &str) -> CoreResult<UserProfile> {
        caller.authorize(email)?;
        let user = self
            .users
            .find_user_by_email(email)
            .await?
            .ok_or_else(|| CoreError::UserNotFound(email.to_string()))?;
        let passenger = self.users.find_passenger_by_user(user.id).await?;
        Ok(UserProfile { user, passenger })
    }

    pub async fn change_password(
        &self,
        caller: &AccessToken,
        email: &str,
        old_password: &str,
        new_password: &str,
    ) -> CoreResult<()> {
        caller.authorize(email)?;
        let user = self
            .users
            .find_user_by_email(email)
            .await?
            .ok_or_else(|| CoreError::UserNotFound(email.to_string()))?;
        require_password(new_password)?;
        if !self.hasher.verify(old_password, user.password_hash.expose()) {
            return Err(CoreError::InvalidCredentials);
        }
        let digest = self.hasher.hash(new_password)?;
        if !self.users.update_password(user.id, &digest).await? {
            return Err(CoreError::UserNotFound(email.to_string()));
        }
        tracing::info!(user_id = user.id, "password changed");
        Ok(())
    }

    pub async fn upsert_passenger(
        &self,
        caller: &AccessToken,
        user_id: i64,
        details: PassengerDetails,
    ) -> CoreResult<Passenger> {
        caller.authorize_id(user_id)?;
        if details.first_name.trim().is_empty() || details.last_name.trim().is_empty() {
            return Err(CoreError::Validation("first and last name are required".into()));
        }
        if self.users.find_user(user_id).await?.is_none() {
            return Err(CoreError::UserNotFound(user_id.to_string()));
        }
        Ok(self.users.upsert_passenger(user_id, details).await?)
    }

    pub async fn delete_account(&self, caller: &AccessToken, user_id: i64) -> CoreResult<DeletedAccount> {
        caller.authorize_id(user_id)?;
        let user = self
            .users
            .find_user(user_id)
            .await?
            .ok_or_else(|| CoreError::UserNotFound(user_id.to_string()))?;
        let cancelled = self
            .users
            .delete_user(user_id)
            .await?
            .ok_or_else(|| CoreError::UserNotFound(user_id.to_string()))?;
        tracing::info!(user_id, cancelled = cancelled.len(), "deleted account");
        Ok(DeletedAccount {
            user,
            cancelled_reservations: cancelled,
        })
    }

    pub async fn list_passengers(&self, caller: &AccessToken) -> CoreResult<Vec<Passenger>> {
        caller.require_admin()?;
        let passengers = self.users.list_passengers().await?;
        if passengers.is_empty() {
            return Err(CoreError::NotFound("No passengers found".into()));
        }
        Ok(passengers)
    }

    pub async fn count_passengers(&self, caller: &AccessToken) -> CoreResult<i64> {
        caller.require_admin()?;
        match self.users.count_passengers().await? {
            0 => Err(CoreError::NotFound("No passengers found".into())),
            n => Ok(n),
        }
    }
}
