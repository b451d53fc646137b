use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{ApiError, AuthGrant, IdentityProvider};
use crate::store::SessionStore;

use super::record::SessionRecord;
use super::scheduler::{RefreshConfig, RefreshScheduler, TimerState};

/// The one session slot of a running client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated(SessionRecord),
}

impl SessionState {
    pub fn session(&self) -> Option<&SessionRecord> {
        match self {
            SessionState::Anonymous => None,
            SessionState::Authenticated(session) => Some(session),
        }
    }
}

/// Owner of the current session.
///
/// Sign-up, sign-in and password change replace the session; logout clears it.
/// The refresh scheduler publishes renewed records through the same state
/// channel, so subscribers always see the latest tokens.
///
/// Calls are not serialized. Racing sign-in and logout resolve
/// last-write-wins.
pub struct SessionController {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<SessionStore>,
    scheduler: RefreshScheduler,
    state: Arc<watch::Sender<SessionState>>,
}

impl SessionController {
    /// Create the controller and restore any stored session.
    ///
    /// Must be called within a Tokio runtime, since a restored session arms
    /// the refresh timer.
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<SessionStore>,
        refresh_config: RefreshConfig,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Anonymous);
        let state = Arc::new(state);
        let scheduler = RefreshScheduler::new(
            Arc::clone(&provider),
            Arc::clone(&store),
            Arc::clone(&state),
            refresh_config,
        );

        let controller = Self {
            provider,
            store,
            scheduler,
            state,
        };
        controller.restore();
        controller
    }

    fn restore(&self) {
        match self.store.get_session() {
            Some(session) if !session.is_expired() => {
                info!(user_id = session.user_id(), "Restored stored session");
                let refresh_token = session.refresh_token().to_string();
                let time_to_refresh = session.time_to_refresh();
                self.state.send_replace(SessionState::Authenticated(session));
                self.scheduler.start_refresh_timer(refresh_token, time_to_refresh);
            }
            Some(session) => {
                debug!(user_id = session.user_id(), "Stored session has expired");
            }
            None => debug!("No stored session"),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receive every session change, including background refreshes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn current_session(&self) -> Option<SessionRecord> {
        self.state.borrow().session().cloned()
    }

    pub fn current_email(&self) -> Option<String> {
        self.state
            .borrow()
            .session()
            .map(|session| session.email().to_string())
    }

    /// Check for a session whose token has not expired.
    /// Evaluated against the clock on every call.
    pub fn is_logged_in(&self) -> bool {
        self.state
            .borrow()
            .session()
            .is_some_and(|session| !session.is_expired())
    }

    pub fn refresh_state(&self) -> TimerState {
        self.scheduler.state()
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<SessionRecord, ApiError> {
        let grant = self
            .provider
            .sign_up(email, password)
            .await
            .inspect_err(|e| warn!(error = %e, "Sign-up failed"))?;
        Ok(self.handle_authentication(grant, remember_me))
    }

    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<SessionRecord, ApiError> {
        let grant = self
            .provider
            .sign_in(email, password)
            .await
            .inspect_err(|e| warn!(error = %e, "Sign-in failed"))?;
        Ok(self.handle_authentication(grant, remember_me))
    }

    /// Change the password of the signed-in user.
    ///
    /// The provider answers with fresh tokens, which replace the current
    /// session under the same remember-me choice.
    pub async fn change_password(&self, new_password: &str) -> Result<SessionRecord, ApiError> {
        let current = self.current_session();
        let remember_me = current.as_ref().is_some_and(SessionRecord::remember_me);
        let token = current
            .as_ref()
            .and_then(SessionRecord::token)
            .map(str::to_string)
            .ok_or(ApiError::NotLoggedIn)?;

        let grant = self
            .provider
            .change_password(&token, new_password)
            .await
            .inspect_err(|e| warn!(error = %e, "Password change failed"))?;
        Ok(self.handle_authentication(grant, remember_me))
    }

    /// Forget the current session. Never fails and makes no network call.
    pub fn logout(&self) {
        // Stop first so a refresh still on the wire cannot publish or persist
        self.scheduler.stop_refresh_timer();
        self.state.send_replace(SessionState::Anonymous);
        self.store.delete_session();
        info!("Logged out");
    }

    fn handle_authentication(&self, grant: AuthGrant, remember_me: bool) -> SessionRecord {
        self.scheduler.stop_refresh_timer();

        let session = SessionRecord::new(
            grant.email,
            grant.user_id,
            grant.id_token,
            grant.expires_in,
            grant.refresh_token,
            remember_me,
        );
        info!(
            user_id = session.user_id(),
            remember_me,
            expires_at = %session.expires_at(),
            "Authenticated"
        );

        self.state
            .send_replace(SessionState::Authenticated(session.clone()));
        self.store.set_session(&session);
        self.scheduler
            .start_refresh_timer(session.refresh_token(), session.time_to_refresh());
        session
    }
}
