//! Accounts and session tokens.

use chrono::{DateTime, Utc};
use common::AccountId;
use serde::{Deserialize, Serialize};

use crate::media::BlobPath;

/// A registered account. The password is only ever held as a PHC hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Unique login (e-mail address).
    pub login: String,
    /// Unique display name.
    pub nickname: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub description: String,
    /// Uploaded avatar. `None` means the default avatar is shown.
    #[serde(default)]
    pub avatar_path: Option<BlobPath>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Returns a copy with the profile edits applied. Absent fields are kept.
    pub fn patched(&self, patch: &ProfilePatch) -> Self {
        let mut next = self.clone();
        if let Some(nickname) = &patch.nickname {
            next.nickname = nickname.clone();
        }
        if let Some(name) = &patch.name {
            next.name = name.clone();
        }
        if let Some(description) = &patch.description {
            next.description = description.clone();
        }
        next
    }
}

/// Self-editable profile fields. Login and password are not editable here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePatch {
    pub nickname: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Opaque session token stored in the session cache and handed out as a cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Generates a fresh random token.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wraps a token received from a client.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
