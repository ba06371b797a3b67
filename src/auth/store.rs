// Token storage
// One token-store contract over HTTP-only cookies, parameterized by a cookie policy.

use axum::http::{header, HeaderMap, HeaderValue};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::types::TokenPair;

/// Cookie holding the access token
pub const ACCESS_COOKIE_NAME: &str = "accessToken";

/// Cookie holding the refresh token
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// Access token cookie lifetime (15 minutes)
pub const ACCESS_MAX_AGE_SECS: u64 = 15 * 60;

/// Refresh token cookie lifetime (30 days)
pub const REFRESH_MAX_AGE_SECS: u64 = 30 * 24 * 60 * 60;

/// Persisted token pair storage
///
/// `set` and `clear` always act on both tokens together.
pub trait TokenStore: Send + Sync {
    /// Current pair, or `None` unless both tokens are present
    fn get(&self) -> Option<TokenPair>;

    /// Refresh token alone (the access cookie may already have lapsed)
    fn refresh_token(&self) -> Option<String>;

    /// Replace both tokens
    fn set(&self, pair: &TokenPair);

    /// Remove both tokens
    fn clear(&self);
}

/// SameSite cookie attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Lax,
    Strict,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SameSite::Lax => write!(f, "Lax"),
            SameSite::Strict => write!(f, "Strict"),
        }
    }
}

/// Attributes applied to both token cookies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookiePolicy {
    pub same_site: SameSite,
    pub secure: bool,
    pub path: String,
    pub access_max_age: u64,
    pub refresh_max_age: u64,
}

impl CookiePolicy {
    /// Policy for browser-facing flows (login form, client navigation)
    pub fn interactive() -> Self {
        Self {
            same_site: SameSite::Lax,
            secure: false,
            path: "/".to_string(),
            access_max_age: ACCESS_MAX_AGE_SECS,
            refresh_max_age: REFRESH_MAX_AGE_SECS,
        }
    }

    /// Policy for server-rendered flows, never sent cross-site
    pub fn server_side() -> Self {
        Self {
            same_site: SameSite::Strict,
            ..Self::interactive()
        }
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Render a `Set-Cookie` value that stores `value` for `max_age` seconds
    pub fn set_cookie(&self, name: &str, value: &str, max_age: u64) -> String {
        let secure = if self.secure { "; Secure" } else { "" };
        format!(
            "{}={}; Path={}; Max-Age={}; HttpOnly; SameSite={}{}",
            name, value, self.path, max_age, self.same_site, secure
        )
    }

    /// Render a `Set-Cookie` value that removes the cookie
    pub fn removal_cookie(&self, name: &str) -> String {
        self.set_cookie(name, "", 0)
    }
}

impl Default for CookiePolicy {
    fn default() -> Self {
        Self::interactive()
    }
}

/// Extract a cookie value from the Cookie header
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    for cookie_header in headers.get_all(header::COOKIE) {
        let Ok(cookie_header) = cookie_header.to_str() else {
            continue;
        };
        for part in cookie_header.split(';') {
            if let Some((key, value)) = part.trim().split_once('=') {
                let value = value.trim();
                if key.trim() == name && !value.is_empty() {
                    return Some(value);
                }
            }
        }
    }
    None
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct CookieState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    pending: Vec<String>,
    /// Removal already queued and nothing stored since
    cleared: bool,
}

/// Token store over one request's cookies
///
/// Reads come from the request's `Cookie` header and reflect writes made
/// while handling the same request. Writes are queued as `Set-Cookie`
/// values for the response.
#[derive(Debug)]
pub struct CookieTokenStore {
    policy: CookiePolicy,
    state: Mutex<CookieState>,
}

impl CookieTokenStore {
    pub fn new(policy: CookiePolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(CookieState::default()),
        }
    }

    pub fn from_headers(headers: &HeaderMap, policy: CookiePolicy) -> Self {
        let state = CookieState {
            access_token: get_cookie(headers, ACCESS_COOKIE_NAME).map(str::to_string),
            refresh_token: get_cookie(headers, REFRESH_COOKIE_NAME).map(str::to_string),
            pending: Vec::new(),
            cleared: false,
        };
        Self {
            policy,
            state: Mutex::new(state),
        }
    }

    pub fn policy(&self) -> &CookiePolicy {
        &self.policy
    }

    /// Drain the queued `Set-Cookie` values
    pub fn take_set_cookies(&self) -> Vec<String> {
        std::mem::take(&mut lock(&self.state).pending)
    }

    /// Append the queued `Set-Cookie` values to a response's headers
    pub fn apply_to(&self, headers: &mut HeaderMap) {
        for cookie in self.take_set_cookies() {
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    headers.append(header::SET_COOKIE, value);
                }
                Err(e) => tracing::warn!(error = %e, "Dropping unrepresentable Set-Cookie value"),
            }
        }
    }
}

impl TokenStore for CookieTokenStore {
    fn get(&self) -> Option<TokenPair> {
        let state = lock(&self.state);
        match (&state.access_token, &state.refresh_token) {
            (Some(access_token), Some(refresh_token)) => Some(TokenPair {
                access_token: access_token.clone(),
                refresh_token: refresh_token.clone(),
            }),
            _ => None,
        }
    }

    fn refresh_token(&self) -> Option<String> {
        lock(&self.state).refresh_token.clone()
    }

    fn set(&self, pair: &TokenPair) {
        let mut state = lock(&self.state);
        state.access_token = Some(pair.access_token.clone());
        state.refresh_token = Some(pair.refresh_token.clone());
        state.cleared = false;

        let access = self.policy.set_cookie(
            ACCESS_COOKIE_NAME,
            &pair.access_token,
            self.policy.access_max_age,
        );
        let refresh = self.policy.set_cookie(
            REFRESH_COOKIE_NAME,
            &pair.refresh_token,
            self.policy.refresh_max_age,
        );
        state.pending.push(access);
        state.pending.push(refresh);
    }

    fn clear(&self) {
        let mut state = lock(&self.state);
        if state.cleared {
            return;
        }
        state.access_token = None;
        state.refresh_token = None;
        state.cleared = true;

        let access = self.policy.removal_cookie(ACCESS_COOKIE_NAME);
        let refresh = self.policy.removal_cookie(REFRESH_COOKIE_NAME);
        state.pending.push(access);
        state.pending.push(refresh);
    }
}

/// In-process token store
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    pair: Mutex<Option<TokenPair>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(pair: TokenPair) -> Self {
        Self {
            pair: Mutex::new(Some(pair)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<TokenPair> {
        lock(&self.pair).clone()
    }

    fn refresh_token(&self) -> Option<String> {
        lock(&self.pair).as_ref().map(|p| p.refresh_token.clone())
    }

    fn set(&self, pair: &TokenPair) {
        *lock(&self.pair) = Some(pair.clone());
    }

    fn clear(&self) {
        *lock(&self.pair) = None;
    }
}
