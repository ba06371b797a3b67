// Authentication types

use serde::{Deserialize, Serialize};

/// Access/refresh token pair
///
/// Both values are always present; a store holding only one of them
/// reports no pair at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Claims decoded from an access token payload
///
/// Only `exp` is required; identity claims fall back to empty strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenPayload {
    /// Subject (user id)
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    /// Expiry, seconds since epoch (NumericDate, may be fractional)
    pub exp: f64,
}

/// Authenticated user identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
}

impl From<TokenPayload> for User {
    fn from(payload: TokenPayload) -> Self {
        Self {
            id: payload.sub,
            email: payload.email,
            name: payload.name,
        }
    }
}

/// Where a token pair stands in the refresh state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Access token present and unexpired
    Valid(String),

    /// Access token missing or expired, refresh token available
    Refreshable(String),

    /// Nothing usable
    Unauthenticated,
}

/// Login exchange request
#[derive(Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Login exchange response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

impl AuthResponse {
    pub fn token_pair(&self) -> TokenPair {
        TokenPair {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}

/// Refresh (and revoke) exchange request
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// Refresh exchange response
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
}
