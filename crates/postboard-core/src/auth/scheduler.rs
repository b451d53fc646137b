//! Proactive token refresh.
//!
//! One timer at most: arming always cancels the previous timer first, and every
//! arm or stop starts a new generation. A refresh only lands (persist, publish,
//! re-arm) if its generation is still current when the provider answers, so a
//! cancelled cycle can never write a session back after logout.
//!
//! ```text
//!            start (delay > 0)             timer fires
//!   Idle ───────────────────────► Armed ──────────────► Firing
//!    ▲  ╲ start (delay = 0)                               │
//!    │   ╰───────────────────────────────────────────────►│
//!    │                                                     │
//!    ╰──── stop / retries exhausted / no stored session ───┤
//!                                   success: re-arm ───────╯
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::{ApiError, IdentityProvider, RefreshGrant};
use crate::store::SessionStore;

use super::controller::SessionState;

/// Retry policy for a scheduled refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub retry_delay: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Observable state of the refresh timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Armed,
    Firing,
}

enum Phase {
    Idle,
    Armed(JoinHandle<()>),
    Firing,
}

struct TimerSlot {
    generation: u64,
    phase: Phase,
}

impl TimerSlot {
    /// End the current cycle. A refresh already on the wire keeps running,
    /// but its generation no longer matches.
    fn cancel(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Phase::Armed(handle) = std::mem::replace(&mut self.phase, Phase::Idle) {
            handle.abort();
        }
    }

    fn state(&self) -> TimerState {
        match self.phase {
            Phase::Idle => TimerState::Idle,
            Phase::Armed(_) => TimerState::Armed,
            Phase::Firing => TimerState::Firing,
        }
    }
}

struct Shared {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<SessionStore>,
    state: Arc<watch::Sender<SessionState>>,
    config: RefreshConfig,
    slot: Mutex<TimerSlot>,
}

impl Shared {
    fn lock_slot(&self) -> MutexGuard<'_, TimerSlot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cancel-then-arm. Called with the slot locked.
    fn arm(self: &Arc<Self>, slot: &mut TimerSlot, refresh_token: String, delay: Duration) {
        slot.cancel();
        let generation = slot.generation;
        let shared = Arc::clone(self);

        if delay.is_zero() {
            debug!(generation, "Token refresh due now");
            slot.phase = Phase::Firing;
            tokio::spawn(shared.run_refresh(refresh_token, generation));
        } else {
            debug!(generation, delay_secs = delay.as_secs(), "Arming token refresh timer");
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if shared.begin_firing(generation) {
                    shared.run_refresh(refresh_token, generation).await;
                }
            });
            slot.phase = Phase::Armed(handle);
        }
    }

    fn begin_firing(&self, generation: u64) -> bool {
        let mut slot = self.lock_slot();
        if slot.generation != generation {
            return false;
        }
        slot.phase = Phase::Firing;
        true
    }

    async fn run_refresh(self: Arc<Self>, refresh_token: String, generation: u64) {
        let result = self.refresh_with_retry(&refresh_token).await;

        let mut slot = self.lock_slot();
        if slot.generation != generation {
            debug!(generation, "Discarding refresh result from a cancelled cycle");
            return;
        }
        slot.phase = Phase::Idle;

        let grant = match result {
            Ok(grant) => grant,
            Err(e) => {
                error!(
                    attempts = self.config.max_attempts,
                    error = %e,
                    "Token refresh failed, session will expire"
                );
                return;
            }
        };

        let Some(current) = self.store.get_session() else {
            debug!("No stored session when refresh completed");
            return;
        };

        let updated =
            current.with_updated_tokens(grant.id_token, grant.expires_in, grant.refresh_token);
        self.store.set_session(&updated);
        info!(
            user_id = updated.user_id(),
            expires_at = %updated.expires_at(),
            "Token refreshed"
        );

        let next_token = updated.refresh_token().to_string();
        let delay = updated.time_to_refresh();
        self.state.send_replace(SessionState::Authenticated(updated));
        self.arm(&mut slot, next_token, delay);
    }

    async fn refresh_with_retry(&self, refresh_token: &str) -> Result<RefreshGrant, ApiError> {
        let mut attempt = 1;
        loop {
            match self.provider.refresh(refresh_token).await {
                Ok(grant) => return Ok(grant),
                Err(e) if attempt < self.config.max_attempts => {
                    warn!(
                        attempt,
                        max_attempts = self.config.max_attempts,
                        error = %e,
                        "Token refresh attempt failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Keeps the stored session's token renewed ahead of expiry.
///
/// Requires a Tokio runtime: timers and refreshes run as spawned tasks.
/// Dropping the scheduler stops its timer.
pub struct RefreshScheduler {
    shared: Arc<Shared>,
}

impl RefreshScheduler {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<SessionStore>,
        state: Arc<watch::Sender<SessionState>>,
        config: RefreshConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                provider,
                store,
                state,
                config,
                slot: Mutex::new(TimerSlot {
                    generation: 0,
                    phase: Phase::Idle,
                }),
            }),
        }
    }

    /// Replace any pending timer with one that refreshes after `time_to_refresh`.
    /// A zero duration refreshes right away.
    pub fn start_refresh_timer(&self, refresh_token: impl Into<String>, time_to_refresh: Duration) {
        let mut slot = self.shared.lock_slot();
        self.shared.arm(&mut slot, refresh_token.into(), time_to_refresh);
    }

    pub fn stop_refresh_timer(&self) {
        let mut slot = self.shared.lock_slot();
        if slot.state() != TimerState::Idle {
            debug!(generation = slot.generation, "Stopping token refresh timer");
        }
        slot.cancel();
    }

    pub fn state(&self) -> TimerState {
        self.shared.lock_slot().state()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop_refresh_timer();
    }
}
