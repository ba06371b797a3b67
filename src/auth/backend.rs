// Exchanges with the external auth backend

use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;

use super::types::{AuthResponse, LoginRequest, RefreshRequest, RefreshResponse, TokenPair};

/// Client for the auth backend's login, refresh and logout endpoints
#[derive(Debug, Clone)]
pub struct AuthBackend {
    client: Client,
    base_url: String,
}

impl AuthBackend {
    /// Create a backend client with the given timeouts (seconds)
    pub fn new(base_url: &str, connect_timeout: u64, request_timeout: u64) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Exchange credentials for a user and token pair
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        tracing::debug!(email = %email, "Sending login exchange");

        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&LoginRequest { email, password })
            .send()
            .await
            .context("Login failed")?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = %status, "Login exchange rejected");
            anyhow::bail!("Invalid credentials");
        }

        let data: AuthResponse = response
            .json()
            .await
            .context("Login failed")?;

        tracing::info!(user_id = %data.user.id, "Login exchange succeeded");
        Ok(data)
    }

    /// Exchange a refresh token for a new token pair
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        tracing::debug!("Refreshing token pair...");

        let response = self
            .client
            .post(self.url("/auth/refresh"))
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .context("Failed to send refresh request")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Refresh failed: {} - {}", status, error_text);
        }

        let data: RefreshResponse = response
            .json()
            .await
            .context("Failed to parse refresh response")?;

        if data.access_token.is_empty() || data.refresh_token.is_empty() {
            anyhow::bail!("Refresh response does not contain a complete token pair");
        }

        tracing::info!("Token pair refreshed");

        Ok(TokenPair {
            access_token: data.access_token,
            refresh_token: data.refresh_token,
        })
    }

    /// Ask the backend to revoke a refresh token
    pub async fn revoke(&self, refresh_token: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url("/auth/logout"))
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .context("Failed to send logout request")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Logout failed: {}", status);
        }

        Ok(())
    }
}
