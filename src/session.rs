use chrono::{DateTime, Utc};
use log::{debug, error, info};

use crate::auth::{AuthProvider, TokenSet};
use crate::error::{Error, Result};

/// An access token together with the instant it stops being presented.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Credentials and the tokens obtained with them.
pub struct Session {
    email: String,
    password: String,
    access: Option<AccessToken>,
    refresh_token: Option<String>,
}

impl Session {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            access: None,
            refresh_token: None,
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access.as_ref().map(|access| access.token.as_str())
    }

    pub fn access_token_expiry(&self) -> Option<DateTime<Utc>> {
        self.access.as_ref().map(|access| access.expires_at)
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    // Token, expiry and refresh token always move together.
    fn apply(&mut self, tokens: &TokenSet) {
        self.access = Some(AccessToken {
            token: tokens.access_token.clone(),
            expires_at: tokens.expires_at,
        });
        self.refresh_token = Some(tokens.refresh_token.clone());
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("email", &self.email)
            .field("access_token_expiry", &self.access_token_expiry())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

/// Owns the session tokens and decides when they need refreshing.
pub struct TokenManager {
    session: Session,
    provider: Box<dyn AuthProvider>,
}

impl TokenManager {
    pub fn new(session: Session, provider: Box<dyn AuthProvider>) -> Self {
        Self { session, provider }
    }

    /// Seeds the manager with tokens obtained elsewhere, e.g. from an
    /// earlier client in the same process.
    pub fn with_tokens(mut self, tokens: &TokenSet) -> Self {
        self.session.apply(tokens);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn login(&mut self) -> Result<TokenSet> {
        debug!("Logging in user: {}", self.session.email);

        let response = match self
            .provider
            .login(&self.session.email, &self.session.password)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("Could not get initial tokens: {}", e);
                return Err(e);
            }
        };

        let tokens = TokenSet::from_response(response, Utc::now())
            .inspect_err(|e| error!("Could not get initial tokens: {}", e))?;
        self.session.apply(&tokens);

        info!("Logged in, access token valid until {}", tokens.expires_at);
        Ok(tokens)
    }

    pub async fn refresh(&mut self) -> Result<TokenSet> {
        let refresh_token = self
            .session
            .refresh_token
            .as_deref()
            .ok_or_else(|| Error::Auth("no refresh token, call login() first".to_string()))?;

        let response = match self.provider.refresh(refresh_token).await {
            Ok(response) => response,
            Err(e) => {
                error!("Could not refresh tokens: {}", e);
                return Err(e);
            }
        };

        let tokens = TokenSet::from_response(response, Utc::now())
            .inspect_err(|e| error!("Could not refresh tokens: {}", e))?;
        self.session.apply(&tokens);

        debug!("Access token refreshed, valid until {}", tokens.expires_at);
        Ok(tokens)
    }

    /// Returns the cached access token, refreshing it first once it has
    /// passed its (margin-adjusted) expiry.
    pub async fn get_valid_access_token(&mut self) -> Result<String> {
        let cached = match &self.session.access {
            Some(access) if Utc::now() <= access.expires_at => Some(access.token.clone()),
            Some(_) => None,
            None => return Err(Error::Auth("not logged in, call login() first".to_string())),
        };

        match cached {
            Some(token) => Ok(token),
            None => {
                debug!("Access token expired, refreshing");
                Ok(self.refresh().await?.access_token)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TokenResponse;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Calls {
        login: AtomicUsize,
        refresh: AtomicUsize,
    }

    struct FakeProvider {
        calls: Arc<Calls>,
        fail_refresh: bool,
    }

    #[async_trait]
    impl AuthProvider for FakeProvider {
        async fn login(&self, email: &str, password: &str) -> Result<TokenResponse> {
            self.calls.login.fetch_add(1, Ordering::SeqCst);
            let access_token_expires_in = match password {
                "password123" => 3600,
                "unbounded" => i64::MAX,
                _ => return Err(Error::Auth(format!("bad credentials for {}", email))),
            };
            Ok(TokenResponse {
                access_token: "login-access".to_string(),
                access_token_expires_in,
                refresh_token: "login-refresh".to_string(),
            })
        }

        async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
            let n = self.calls.refresh.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_refresh {
                return Err(Error::Auth(format!("refresh rejected: {}", refresh_token)));
            }
            Ok(TokenResponse {
                access_token: format!("refreshed-access-{}", n),
                access_token_expires_in: 3600,
                refresh_token: format!("refreshed-refresh-{}", n),
            })
        }
    }

    fn manager(password: &str, fail_refresh: bool) -> (TokenManager, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let provider = FakeProvider {
            calls: calls.clone(),
            fail_refresh,
        };
        let manager = TokenManager::new(
            Session::new("test@example.com", password),
            Box::new(provider),
        );
        (manager, calls)
    }

    fn expired_tokens() -> TokenSet {
        TokenSet {
            access_token: "stale-access".to_string(),
            refresh_token: "stale-refresh".to_string(),
            expires_at: Utc::now() - Duration::seconds(1),
        }
    }

    #[tokio::test]
    async fn test_login_then_token_does_not_refresh() {
        let (mut manager, calls) = manager("password123", false);

        let tokens = manager.login().await.unwrap();
        let token = manager.get_valid_access_token().await.unwrap();

        assert_eq!(token, tokens.access_token);
        assert_eq!(token, "login-access");
        assert_eq!(calls.login.load(Ordering::SeqCst), 1);
        assert_eq!(calls.refresh.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_login_sets_all_token_fields() {
        let (mut manager, _) = manager("password123", false);
        assert!(manager.session().access_token().is_none());
        assert!(manager.session().access_token_expiry().is_none());
        assert!(manager.session().refresh_token().is_none());

        let before = Utc::now();
        manager.login().await.unwrap();

        let session = manager.session();
        assert_eq!(session.access_token(), Some("login-access"));
        assert_eq!(session.refresh_token(), Some("login-refresh"));
        let expiry = session.access_token_expiry().unwrap();
        assert!(expiry >= before + Duration::seconds(3540));
        assert!(expiry <= Utc::now() + Duration::seconds(3540));
    }

    #[tokio::test]
    async fn test_login_failure_propagates() {
        let (mut manager, calls) = manager("wrong", false);

        let result = manager.login().await;
        assert!(matches!(result, Err(Error::Auth(_))));
        assert_eq!(calls.login.load(Ordering::SeqCst), 1);
        assert!(manager.session().access_token().is_none());
        assert!(manager.session().refresh_token().is_none());
    }

    #[tokio::test]
    async fn test_login_with_unbounded_lifetime_fails() {
        let (mut manager, calls) = manager("unbounded", false);

        let result = manager.login().await;
        match result {
            Err(Error::Auth(message)) => assert_eq!(message, "invalid token lifetime"),
            other => panic!("expected auth error, got {:?}", other),
        }
        assert_eq!(calls.login.load(Ordering::SeqCst), 1);
        assert!(manager.session().access_token().is_none());
        assert!(manager.session().access_token_expiry().is_none());
        assert!(manager.session().refresh_token().is_none());
    }

    #[tokio::test]
    async fn test_expired_token_triggers_exactly_one_refresh() {
        let (manager, calls) = manager("password123", false);
        let mut manager = manager.with_tokens(&expired_tokens());

        let token = manager.get_valid_access_token().await.unwrap();
        assert_eq!(token, "refreshed-access-1");
        assert_eq!(calls.refresh.load(Ordering::SeqCst), 1);

        // The refreshed token is fresh, so a second read is served from cache.
        let token = manager.get_valid_access_token().await.unwrap();
        assert_eq!(token, "refreshed-access-1");
        assert_eq!(calls.refresh.load(Ordering::SeqCst), 1);

        assert_eq!(manager.session().refresh_token(), Some("refreshed-refresh-1"));
        assert_eq!(calls.login.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_refresh_token() {
        let (manager, calls) = manager("password123", true);
        let mut manager = manager.with_tokens(&expired_tokens());

        let result = manager.get_valid_access_token().await;
        assert!(matches!(result, Err(Error::Auth(_))));
        assert_eq!(calls.refresh.load(Ordering::SeqCst), 1);
        assert_eq!(manager.session().refresh_token(), Some("stale-refresh"));
        assert_eq!(manager.session().access_token(), Some("stale-access"));
    }

    #[tokio::test]
    async fn test_token_before_login_is_an_auth_error() {
        let (mut manager, calls) = manager("password123", false);

        let result = manager.get_valid_access_token().await;
        assert!(matches!(result, Err(Error::Auth(_))));
        assert_eq!(calls.refresh.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let (mut manager, calls) = manager("password123", false);

        assert!(matches!(manager.refresh().await, Err(Error::Auth(_))));
        assert_eq!(calls.refresh.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_session_debug_hides_secrets() {
        let session = Session::new("test@example.com", "hunter2");
        let debug = format!("{:?}", session);
        assert!(debug.contains("test@example.com"));
        assert!(!debug.contains("hunter2"));
    }
}
