// Dashboard data loading
// Bounded retry for data fetches and per-widget failure placeholders

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::api_client::ApiClient;
use crate::auth::TokenStore;
use crate::error::ClientError;

/// Placeholder shown in place of a widget whose data failed to load
pub const WIDGET_FAILED_MESSAGE: &str = "Failed to load";

/// Summary returned by `GET /api/dashboard`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub total_users: u64,
    pub total_revenue: f64,
    pub active_projects: u64,
    pub recent_activity: Vec<Activity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub timestamp: String,
}

/// Profile returned by `GET /api/user`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub last_login: String,
    pub preferences: Preferences,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub theme: String,
    pub notifications: bool,
}

/// One dashboard widget's data, or the reason it is missing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Widget<T> {
    Loaded { data: T },
    Failed { message: String },
}

impl<T> Widget<T> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Widget::Loaded { .. })
    }
}

/// Everything the dashboard page renders
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub summary: Widget<DashboardData>,
    pub profile: Widget<UserData>,
}

/// Bounded retry for data fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first failure
    pub max_retries: u32,

    /// Base delay for exponential backoff (milliseconds)
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `failures` failed attempts
    pub fn should_retry(&self, failures: u32, error: &ClientError) -> bool {
        error.is_retryable() && failures <= self.max_retries
    }

    /// Delay before the retry following the given number of failures
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        // base * 2^(failures - 1), capped at 30s
        let exponent = failures.saturating_sub(1).min(16);
        let delay = self.base_delay_ms.saturating_mul(2_u64.pow(exponent));
        Duration::from_millis(delay.min(30_000))
    }
}

/// Run a fetch, retrying retryable failures under the policy
pub async fn fetch_with_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut failures = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                failures += 1;
                if !policy.should_retry(failures, &e) {
                    return Err(e);
                }

                let delay = policy.backoff_delay(failures);
                tracing::warn!(
                    "Fetch failed: {}, retrying after {}ms (attempt {}/{})",
                    e,
                    delay.as_millis(),
                    failures,
                    policy.max_retries
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn into_widget<T>(name: &str, result: Result<T, ClientError>) -> Result<Widget<T>, ClientError> {
    match result {
        Ok(data) => Ok(Widget::Loaded { data }),
        Err(ClientError::Unauthorized) => Err(ClientError::Unauthorized),
        Err(e) => {
            tracing::warn!(widget = name, error = %e, "Widget data unavailable");
            Ok(Widget::Failed {
                message: WIDGET_FAILED_MESSAGE.to_string(),
            })
        }
    }
}

/// Load both dashboard widgets
///
/// A widget that fails renders a placeholder; losing the session fails the
/// whole load so the caller can send the user to the login page.
pub async fn load_dashboard(
    client: &ApiClient,
    store: &dyn TokenStore,
    policy: RetryPolicy,
) -> Result<DashboardView, ClientError> {
    let summary = fetch_with_retry(policy, move || client.get_dashboard(store)).await;
    let summary = into_widget("summary", summary)?;

    let profile = fetch_with_retry(policy, move || client.get_user(store)).await;
    let profile = into_widget("profile", profile)?;

    Ok(DashboardView { summary, profile })
}
