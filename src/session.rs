// Session context
// Current-user state plus login/logout actions for the presentation layer

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::auth::{codec, AuthBackend, RefreshCoordinator, TokenStore, User};

/// Where the presentation layer should go next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// Login entry point
    Login,

    /// Protected area
    Dashboard,
}

impl Navigation {
    pub fn path<'a>(&self, login_path: &'a str, protected_prefix: &'a str) -> &'a str {
        match self {
            Navigation::Login => login_path,
            Navigation::Dashboard => protected_prefix,
        }
    }
}

/// Result of a login attempt; failures are reported, never raised
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub navigate: Option<Navigation>,
}

impl LoginOutcome {
    fn succeeded(user: User) -> Self {
        Self {
            success: true,
            user: Some(user),
            error: None,
            navigate: Some(Navigation::Dashboard),
        }
    }

    fn failed(error: String) -> Self {
        Self {
            success: false,
            user: None,
            error: Some(error),
            navigate: None,
        }
    }
}

/// Snapshot of the session for rendering
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub user: Option<User>,
    pub is_loading: bool,
    pub is_authenticated: bool,
}

#[derive(Debug)]
struct SessionView {
    user: Option<User>,
    is_loading: bool,
}

/// Resolve the signed-in user from the store, refreshing if needed
pub async fn current_user(coordinator: &RefreshCoordinator, store: &dyn TokenStore) -> Option<User> {
    let access_token = coordinator.get_valid_access_token(store).await?;
    codec::user_from_token(&access_token)
}

/// Presentation-facing session state
///
/// Starts out loading; `load` settles it. `login` and `logout` keep the
/// local user in step with the token store.
pub struct SessionContext {
    backend: Arc<AuthBackend>,
    coordinator: Arc<RefreshCoordinator>,
    revoke_on_logout: bool,
    view: RwLock<SessionView>,
}

impl SessionContext {
    pub fn new(
        backend: Arc<AuthBackend>,
        coordinator: Arc<RefreshCoordinator>,
        revoke_on_logout: bool,
    ) -> Self {
        Self {
            backend,
            coordinator,
            revoke_on_logout,
            view: RwLock::new(SessionView {
                user: None,
                is_loading: true,
            }),
        }
    }

    pub async fn user(&self) -> Option<User> {
        self.view.read().await.user.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.view.read().await.is_loading
    }

    pub async fn is_authenticated(&self) -> bool {
        self.view.read().await.user.is_some()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let view = self.view.read().await;
        SessionSnapshot {
            user: view.user.clone(),
            is_loading: view.is_loading,
            is_authenticated: view.user.is_some(),
        }
    }

    /// Resolve the current user from the stored session
    pub async fn load(&self, store: &dyn TokenStore) -> Option<User> {
        let user = current_user(&self.coordinator, store).await;

        let mut view = self.view.write().await;
        view.user = user.clone();
        view.is_loading = false;

        user
    }

    /// Exchange credentials, store the new pair and adopt the user
    pub async fn login(&self, store: &dyn TokenStore, email: &str, password: &str) -> LoginOutcome {
        match self.backend.login(email, password).await {
            Ok(response) => {
                store.set(&response.token_pair());

                let mut view = self.view.write().await;
                view.user = Some(response.user.clone());
                view.is_loading = false;

                LoginOutcome::succeeded(response.user)
            }
            Err(e) => {
                tracing::warn!("Login failed: {:#}", e);
                LoginOutcome::failed(e.to_string())
            }
        }
    }

    /// End the session
    ///
    /// Revocation at the backend is best-effort; local state is always
    /// cleared and the caller is always sent to the login entry point.
    pub async fn logout(&self, store: &dyn TokenStore) -> Navigation {
        if self.revoke_on_logout {
            if let Some(refresh_token) = store.refresh_token() {
                if let Err(e) = self.backend.revoke(&refresh_token).await {
                    tracing::warn!("Logout error: {:#}", e);
                }
            }
        }

        store.clear();

        let mut view = self.view.write().await;
        view.user = None;
        view.is_loading = false;

        Navigation::Login
    }
}
