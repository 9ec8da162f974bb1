use async_trait::async_trait;
use std::sync::LazyLock;

use chrono::{DateTime, TimeDelta, Utc};
use log::debug;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, LOCATION};
use reqwest::redirect::{Attempt, Policy};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::types::{LoginForm, RefreshRequest, TokenResponse};

/// Access tokens are treated as expired this many seconds before the
/// lifetime the vendor reports.
pub const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// Scheme of the redirect that carries the token URL at the end of the
/// login form flow.
const APP_REDIRECT_SCHEME: &str = "ondus";

const MAX_REDIRECTS: usize = 10;

static FORM_ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<form\b[^>]*?\baction\s*=\s*"([^"]+)""#)
        .expect("valid form action pattern")
});

/// Tokens issued by a login or refresh, with the expiry margin applied.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenSet {
    /// Fails when the reported lifetime does not fit a timestamp.
    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Result<Self> {
        let expires_at = response
            .access_token_expires_in
            .checked_sub(TOKEN_EXPIRY_MARGIN_SECS)
            .and_then(TimeDelta::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| Error::Auth("invalid token lifetime".to_string()))?;

        Ok(Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at,
        })
    }
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Issues token pairs from credentials or from a refresh token.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<TokenResponse>;
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse>;
}

/// Talks to the vendor's OIDC endpoints.
///
/// Login walks the same browser flow as the official app: fetch the login
/// page, post the credentials to its form, then follow the app redirect to
/// the token URL. Refresh is a plain JSON exchange.
pub struct OndusAuthProvider {
    client: reqwest::Client,
    base_url: String,
    token_scheme: String,
}

impl OndusAuthProvider {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(Policy::custom(stop_at_app_redirect))
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            token_scheme: "https".to_string(),
        })
    }

    /// Scheme the app redirect is rewritten to before fetching tokens.
    pub fn with_token_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.token_scheme = scheme.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn fetch_tokens(&self, url: &str) -> Result<TokenResponse> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Auth(format!("token endpoint returned {}", status)));
        }

        Ok(response.json::<TokenResponse>().await?)
    }
}

#[async_trait]
impl AuthProvider for OndusAuthProvider {
    async fn login(&self, email: &str, password: &str) -> Result<TokenResponse> {
        debug!("Fetching login form");

        let response = self
            .client
            .get(api_url(&self.base_url, "oidc/login"))
            .send()
            .await?;

        let status = response.status();
        let page_url = response.url().clone();
        let page = response.text().await?;

        if !status.is_success() {
            return Err(Error::Auth(format!("login page returned {}", status)));
        }

        let action = extract_form_action(&page)
            .ok_or_else(|| Error::Auth("login form not found".to_string()))?;
        let action_url = page_url
            .join(&action)
            .map_err(|e| Error::Auth(format!("invalid login form action: {}", e)))?;

        debug!("Submitting credentials for user: {}", email);

        let response = self
            .client
            .post(action_url)
            .form(&LoginForm {
                username: email,
                password,
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| Error::Auth("login redirect without location".to_string()))?;

            let token_url = token_url_from_location(location, &self.token_scheme);
            debug!("Exchanging login redirect for tokens");
            return self.fetch_tokens(&token_url).await;
        }

        let body = response.text().await?;
        if status.is_success() {
            // Bad credentials re-render the login page instead of redirecting.
            return serde_json::from_str::<TokenResponse>(&body)
                .map_err(|_| Error::Auth("invalid email or password".to_string()));
        }

        Err(Error::Auth(format!("login failed with status {}", status)))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        debug!("Refreshing access token");

        let response = self
            .client
            .post(api_url(&self.base_url, "oidc/refresh"))
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!(
                "token refresh failed with status {}: {}",
                status, error_text
            )));
        }

        Ok(response.json::<TokenResponse>().await?)
    }
}

fn stop_at_app_redirect(attempt: Attempt) -> reqwest::redirect::Action {
    if attempt.url().scheme() == APP_REDIRECT_SCHEME {
        attempt.stop()
    } else if attempt.previous().len() >= MAX_REDIRECTS {
        attempt.error("too many redirects")
    } else {
        attempt.follow()
    }
}

/// Pulls the `action` attribute of the first `<form>` out of the login page.
pub fn extract_form_action(page: &str) -> Option<String> {
    let action = FORM_ACTION.captures(page)?.get(1)?.as_str();
    Some(action.replace("&amp;", "&"))
}

/// The app redirect points at the token endpoint under a custom scheme.
pub fn token_url_from_location(location: &str, scheme: &str) -> String {
    match location
        .strip_prefix(APP_REDIRECT_SCHEME)
        .and_then(|rest| rest.strip_prefix("://"))
    {
        Some(rest) => format!("{}://{}", scheme, rest),
        None => location.to_string(),
    }
}

pub(crate) fn bearer_headers(access_token: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let auth_value = format!("Bearer {}", access_token);
    let auth_value = HeaderValue::from_str(&auth_value)
        .map_err(|_| Error::Auth("access token is not a valid header value".to_string()))?;
    headers.insert(AUTHORIZATION, auth_value);

    Ok(headers)
}

/// Resolves `path` against the configured API base URL.
pub(crate) fn api_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}
