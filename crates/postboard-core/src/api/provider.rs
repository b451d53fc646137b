use futures::future::BoxFuture;

use super::ApiError;

/// Tokens issued by sign-up, sign-in and password change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGrant {
    pub email: String,
    pub user_id: String,
    pub id_token: String,
    /// Token lifetime in seconds
    pub expires_in: i64,
    pub refresh_token: String,
}

/// Tokens issued by a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshGrant {
    pub id_token: String,
    pub expires_in: i64,
    pub refresh_token: String,
}

/// The remote identity provider.
///
/// Methods return boxed futures so the controller and the refresh task can
/// share one `Arc<dyn IdentityProvider>`.
pub trait IdentityProvider: Send + Sync {
    fn sign_up<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<AuthGrant, ApiError>>;

    fn sign_in<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<AuthGrant, ApiError>>;

    fn change_password<'a>(
        &'a self,
        id_token: &'a str,
        new_password: &'a str,
    ) -> BoxFuture<'a, Result<AuthGrant, ApiError>>;

    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, Result<RefreshGrant, ApiError>>;
}
