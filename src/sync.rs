//! API Sync Module
//!
//! Handles HTTP communication with the WhereAreYou API.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// API client for the WhereAreYou backend
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchange user credentials for a token pair
    pub async fn sign_in(&self, user_id: &str, password: &str) -> Result<SignInResponse, ApiError> {
        let url = format!("{}/member/login", self.base_url);

        debug!("Signing in at: {}", url);

        let response = self.client
            .post(&url)
            .json(&SignInRequest { user_id, password })
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let data = Self::parse::<SignInResponse>(response).await?;

        info!("Signed in as member: {}", data.member_id);
        Ok(data)
    }

    /// Reissue an access token from a refresh token
    pub async fn reissue_token(
        &self,
        member_id: &str,
        refresh_token: &str,
    ) -> Result<ReissueTokenResponse, ApiError> {
        let url = format!("{}/member/tokenReissue", self.base_url);

        let response = self.client
            .post(&url)
            .json(&ReissueTokenRequest { member_id, refresh_token })
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Self::parse(response).await
    }

    /// Submit the device's current position
    pub async fn send_user_location(
        &self,
        access_token: &str,
        request: &SendUserLocationRequest,
    ) -> Result<bool, ApiError> {
        let url = format!("{}/location", self.base_url);

        let response = self.client
            .post(&url)
            .header("Authorization", bearer(access_token))
            .json(request)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Self::parse(response).await
    }

    /// Fetch the latest known positions of other members
    pub async fn get_user_location(
        &self,
        access_token: &str,
        request: &GetUserLocationRequest,
    ) -> Result<Vec<UserLocation>, ApiError> {
        let url = format!("{}/location/list", self.base_url);

        let response = self.client
            .post(&url)
            .header("Authorization", bearer(access_token))
            .json(request)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Self::parse(response).await
    }

    async fn parse<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status();

        if !status.is_success() {
            let message = response.json::<ErrorResponse>().await
                .map(|body| body.message)
                .unwrap_or_else(|_| format!("Status: {}", status));
            return Err(ApiError::Server { status: status.as_u16(), message });
        }

        response.json::<T>().await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }
}

/// `Authorization` header value for a stored access token.
///
/// Tokens saved after sign-in already carry the scheme; bare tokens get one.
pub fn bearer(access_token: &str) -> String {
    if access_token.starts_with("Bearer ") {
        access_token.to_string()
    } else {
        format!("Bearer {}", access_token)
    }
}

// Request/Response types

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    user_id: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub member_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReissueTokenRequest<'a> {
    member_id: &'a str,
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReissueTokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendUserLocationRequest {
    pub member_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetUserLocationRequest {
    pub member_id: String,
    pub friend_member_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLocation {
    pub member_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(alias = "error")]
    message: String,
}

/// API errors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}
