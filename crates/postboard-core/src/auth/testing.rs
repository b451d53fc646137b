//! In-process identity provider for unit tests.

use std::sync::Mutex;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio::time::Instant;

use crate::api::{ApiError, AuthGrant, IdentityProvider, RefreshGrant};

pub(crate) struct FakeProvider {
    refresh_calls: Mutex<Vec<(String, Instant)>>,
    auth_calls: Mutex<Vec<(&'static str, String)>>,
    fail_refresh: bool,
    auth_error: Option<String>,
    latency: Duration,
}

impl FakeProvider {
    pub(crate) fn new() -> Self {
        Self {
            refresh_calls: Mutex::new(Vec::new()),
            auth_calls: Mutex::new(Vec::new()),
            fail_refresh: false,
            auth_error: None,
            latency: Duration::ZERO,
        }
    }

    pub(crate) fn failing_refresh() -> Self {
        Self {
            fail_refresh: true,
            ..Self::new()
        }
    }

    pub(crate) fn failing_auth(message: &str) -> Self {
        Self {
            auth_error: Some(message.to_string()),
            ..Self::new()
        }
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn refresh_calls(&self) -> Vec<(String, Instant)> {
        self.refresh_calls.lock().unwrap().clone()
    }

    pub(crate) fn refresh_tokens(&self) -> Vec<String> {
        self.refresh_calls().into_iter().map(|(token, _)| token).collect()
    }

    /// Operation name and credential (password or id token) for each auth call
    pub(crate) fn auth_calls(&self) -> Vec<(&'static str, String)> {
        self.auth_calls.lock().unwrap().clone()
    }

    fn authenticate(
        &self,
        operation: &'static str,
        email: &str,
        credential: &str,
    ) -> BoxFuture<'static, Result<AuthGrant, ApiError>> {
        self.auth_calls
            .lock()
            .unwrap()
            .push((operation, credential.to_string()));
        let result = match &self.auth_error {
            Some(message) => Err(ApiError::Provider(message.clone())),
            None => Ok(AuthGrant {
                email: email.to_string(),
                user_id: "uid-1".to_string(),
                id_token: format!("T-{}", operation),
                expires_in: 3600,
                refresh_token: format!("R-{}", operation),
            }),
        };
        let latency = self.latency;
        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            result
        }
        .boxed()
    }
}

impl IdentityProvider for FakeProvider {
    fn sign_up<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<AuthGrant, ApiError>> {
        self.authenticate("sign-up", email, password)
    }

    fn sign_in<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<AuthGrant, ApiError>> {
        self.authenticate("sign-in", email, password)
    }

    fn change_password<'a>(
        &'a self,
        id_token: &'a str,
        _new_password: &'a str,
    ) -> BoxFuture<'a, Result<AuthGrant, ApiError>> {
        self.authenticate("change-password", "a@b.com", id_token)
    }

    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, Result<RefreshGrant, ApiError>> {
        let attempt = {
            let mut calls = self.refresh_calls.lock().unwrap();
            calls.push((refresh_token.to_string(), Instant::now()));
            calls.len()
        };
        let result = if self.fail_refresh {
            Err(ApiError::Provider("TOKEN_EXPIRED".to_string()))
        } else {
            Ok(RefreshGrant {
                id_token: format!("T{}", attempt),
                expires_in: 3600,
                refresh_token: format!("R{}", attempt),
            })
        };
        let latency = self.latency;
        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            result
        }
        .boxed()
    }
}
