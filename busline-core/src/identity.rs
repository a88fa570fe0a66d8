use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().trim_start_matches("ROLE_") {
            "USER" => Some(Role::User),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller identity decoded from a bearer token. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// Email of the user or admin the token was issued to.
    pub subject: String,
    /// User id, or admin id for admin tokens.
    pub entity_id: i64,
    pub roles: BTreeSet<Role>,
}

impl AccessToken {
    pub fn new(subject: impl Into<String>, entity_id: i64, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            subject: subject.into(),
            entity_id,
            roles: roles.into_iter().collect(),
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    pub fn require_admin(&self) -> CoreResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(CoreError::AccessDenied)
        }
    }

    /// Admins may act on anything; everyone else only on their own email or id.
    pub fn authorize(&self, target: &str) -> CoreResult<()> {
        if self.is_admin() || self.subject == target || self.entity_id.to_string() == target {
            return Ok(());
        }
        tracing::warn!(subject = %self.subject, target, "access denied");
        Err(CoreError::AccessDenied)
    }

    pub fn authorize_id(&self, id: i64) -> CoreResult<()> {
        self.authorize(&id.to_string())
    }

    /// Comma-joined role names, as reported at login.
    pub fn role_label(&self) -> String {
        self.roles.iter().map(Role::as_str).collect::<Vec<_>>().join(",")
    }
}
