use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::backend::AuthBackend;
use super::codec;
use super::store::TokenStore;
use super::types::{SessionState, TokenPair};

/// How concurrent refresh exchanges for the same refresh token are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshMode {
    /// Every caller runs its own exchange; the last store write wins
    #[default]
    Independent,

    /// Callers presenting the same refresh token await one shared exchange
    SingleFlight,
}

type RefreshFlight = Shared<BoxFuture<'static, Option<TokenPair>>>;

/// Session refresh coordinator
///
/// Decides whether a stored access token is usable and, when it is not,
/// exchanges the refresh token for a new pair. Holds no tokens itself: every
/// operation reads and writes the store it is handed.
pub struct RefreshCoordinator {
    backend: Arc<AuthBackend>,
    mode: RefreshMode,

    /// Exchanges currently running, keyed by the refresh token presented
    in_flight: Arc<Mutex<HashMap<String, RefreshFlight>>>,
}

impl RefreshCoordinator {
    pub fn new(backend: Arc<AuthBackend>, mode: RefreshMode) -> Self {
        Self {
            backend,
            mode,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn mode(&self) -> RefreshMode {
        self.mode
    }

    /// Classify the stored pair
    pub fn assess(&self, store: &dyn TokenStore) -> SessionState {
        if let Some(pair) = store.get() {
            if !codec::is_expired(&pair.access_token) {
                return SessionState::Valid(pair.access_token);
            }
        }

        match store.refresh_token() {
            Some(refresh_token) => SessionState::Refreshable(refresh_token),
            None => SessionState::Unauthenticated,
        }
    }

    /// Get a usable access token, refreshing at most once if necessary
    ///
    /// Never fails: `None` means there is no session. A failed exchange
    /// clears the store.
    pub async fn get_valid_access_token(&self, store: &dyn TokenStore) -> Option<String> {
        match self.assess(store) {
            SessionState::Valid(access_token) => Some(access_token),
            SessionState::Refreshable(refresh_token) => {
                tracing::debug!("Access token missing or expired, refreshing");
                self.refresh_with(store, refresh_token).await
            }
            SessionState::Unauthenticated => None,
        }
    }

    /// Exchange the stored refresh token regardless of access token state
    ///
    /// Used after the API rejected an access token that still looked valid.
    pub async fn refresh(&self, store: &dyn TokenStore) -> Option<String> {
        match store.refresh_token() {
            Some(refresh_token) => self.refresh_with(store, refresh_token).await,
            None => {
                store.clear();
                None
            }
        }
    }

    async fn refresh_with(&self, store: &dyn TokenStore, refresh_token: String) -> Option<String> {
        match self.exchange(refresh_token).await {
            Some(pair) => {
                store.set(&pair);
                Some(pair.access_token)
            }
            None => {
                tracing::warn!("Session refresh failed, clearing stored tokens");
                store.clear();
                None
            }
        }
    }

    async fn exchange(&self, refresh_token: String) -> Option<TokenPair> {
        match self.mode {
            RefreshMode::Independent => run_exchange(self.backend.clone(), refresh_token).await,
            RefreshMode::SingleFlight => {
                let flight = {
                    let key = refresh_token.clone();
                    lock(&self.in_flight)
                        .entry(refresh_token)
                        .or_insert_with(|| self.start_flight(key))
                        .clone()
                };

                flight.await
            }
        }
    }

    /// Run one exchange as its own task
    ///
    /// The task outlives cancelled waiters and drops its map entry when the
    /// exchange settles. Must be called with the map locked so the entry is
    /// inserted before the task can remove it.
    fn start_flight(&self, refresh_token: String) -> RefreshFlight {
        let backend = self.backend.clone();
        let in_flight = Arc::clone(&self.in_flight);

        let task = tokio::spawn(async move {
            let outcome = run_exchange(backend, refresh_token.clone()).await;
            lock(&in_flight).remove(&refresh_token);
            outcome
        });

        task.map(|joined| {
            joined.unwrap_or_else(|e| {
                tracing::error!("Refresh exchange task failed: {}", e);
                None
            })
        })
        .boxed()
        .shared()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_exchange(backend: Arc<AuthBackend>, refresh_token: String) -> Option<TokenPair> {
    match backend.refresh(&refresh_token).await {
        Ok(pair) => Some(pair),
        Err(e) => {
            tracing::warn!("Refresh exchange failed: {:#}", e);
            None
        }
    }
}
