//! OAuth client-credentials exchange for the synthesis access token.

use serde::Deserialize;
use std::time::Duration;

use super::client::{build_agent, USER_AGENT};
use crate::config::{AccessToken, Credentials};
use crate::error::SpeakerError;

pub const TOKEN_URL: &str = "https://openapi.baidu.com/oauth/2.0/token";

/// Token endpoint deadline
pub const TOKEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Turns an API key / secret key pair into an access token.
pub trait CredentialExchange: Send + Sync {
    fn exchange(&self, credentials: &Credentials) -> Result<AccessToken, SpeakerError>;
}

pub struct BaiduOAuth {
    agent: ureq::Agent,
    endpoint: String,
}

impl BaiduOAuth {
    pub fn new() -> Self {
        Self::with_endpoint(TOKEN_URL)
    }

    pub fn with_endpoint(endpoint: &str) -> Self {
        Self {
            agent: build_agent(TOKEN_TIMEOUT),
            endpoint: endpoint.to_string(),
        }
    }

    fn token_url(&self, credentials: &Credentials) -> String {
        format!(
            "{}?grant_type=client_credentials&client_id={}&client_secret={}",
            self.endpoint,
            urlencoding::encode(&credentials.api_key),
            urlencoding::encode(&credentials.secret_key)
        )
    }
}

impl Default for BaiduOAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialExchange for BaiduOAuth {
    fn exchange(&self, credentials: &Credentials) -> Result<AccessToken, SpeakerError> {
        let mut response = self
            .agent
            .post(&self.token_url(credentials))
            .header("User-Agent", USER_AGENT)
            .send_empty()?;

        let status = response.status().as_u16();
        let body = response.body_mut().read_to_string()?;

        match parse_token_response(&body) {
            // Error payloads arrive with 4xx statuses; prefer their message
            Err(SpeakerError::Malformed(_)) if !(200..300).contains(&status) => {
                Err(SpeakerError::Status(status))
            }
            other => other,
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Parse the token endpoint JSON. Extra fields are ignored.
pub fn parse_token_response(body: &str) -> Result<AccessToken, SpeakerError> {
    let response: TokenResponse = serde_json::from_str(body)?;

    if let Some(error) = response.error {
        return Err(SpeakerError::TokenRejected {
            error,
            description: response.error_description.unwrap_or_default(),
        });
    }

    let expires_in = response.expires_in.unwrap_or(0);
    if expires_in <= 0 {
        return Err(SpeakerError::TokenExpired(expires_in));
    }

    match response.access_token {
        Some(token) if !token.trim().is_empty() => {
            Ok(AccessToken::from_expires_in(token.trim(), expires_in))
        }
        _ => Err(SpeakerError::TokenMissing),
    }
}
