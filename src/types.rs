use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[repr(transparent)]
pub struct UserID(pub i64);

impl fmt::Display for UserID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[repr(transparent)]
pub struct Email(pub String);

#[derive(Debug, Clone, Deserialize, Serialize)]
#[repr(transparent)]
pub struct HashedPassword(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[repr(transparent)]
pub struct FavoriteID(pub i64);

/// The identity a token is issued for. `email` is optional because tokens
/// derived from a refresh token only know the subject id.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Identity {
    pub id: UserID,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Identity {
    pub fn new(id: UserID, email: Option<String>) -> Self {
        Self { id, email }
    }
}

/// Refresh tokens carry the subject id and nothing else.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub(crate) struct RefreshSubject {
    pub(crate) id: UserID,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedAccessToken {
    pub access_token: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: Email,
    pub hashed_password: HashedPassword,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: UserID,
    pub email: Email,
    pub name: Option<String>,
    pub hashed_password: HashedPassword,
}

/// The public view of a user returned on login.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UserProfile {
    pub id: UserID,
    pub email: Email,
    pub name: Option<String>,
}

impl From<&UserRecord> for UserProfile {
    fn from(record: &UserRecord) -> Self {
        Self {
            id: record.id,
            email: record.email.clone(),
            name: record.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NewFavorite {
    pub country_name: String,
    pub flag: Option<String>,
    pub capital: Option<String>,
    pub population: Option<u64>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Favorite {
    pub id: FavoriteID,
    pub user_id: UserID,
    #[serde(flatten)]
    pub country: NewFavorite,
}
