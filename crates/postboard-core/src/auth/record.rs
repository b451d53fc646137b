use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Time before expiry at which the token should be renewed (5 minutes)
const TOKEN_REFRESH_THRESHOLD_MINUTES: i64 = 5;

/// Longest token lifetime accepted from the provider or from storage (one year)
pub const MAX_TOKEN_LIFETIME_SECS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Token lifetime of {0}s is out of range")]
pub struct InvalidLifetime(pub i64);

/// Accept a token lifetime between zero and [`MAX_TOKEN_LIFETIME_SECS`]
pub fn validate_lifetime(seconds: i64) -> Result<i64, InvalidLifetime> {
    if (0..=MAX_TOKEN_LIFETIME_SECS).contains(&seconds) {
        Ok(seconds)
    } else {
        Err(InvalidLifetime(seconds))
    }
}

/// Serialized form of a [`SessionRecord`], as written to session storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SessionSnapshot {
    pub email: String,
    pub user_id: String,
    pub token: String,
    pub refresh_token: String,
    pub created_at: DateTime<Utc>,
    /// Token lifetime in seconds, as reported by the identity provider
    pub expires_in: i64,
    pub remember_me: bool,
}

/// Credential state for one authenticated user.
///
/// Expiry is a function of wall-clock time, so `is_expired` and
/// `time_to_refresh` are recomputed on every call. The bearer token is never
/// handed out once it has expired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    email: String,
    user_id: String,
    token: String,
    refresh_token: String,
    created_at: DateTime<Utc>,
    expires_in: i64,
    remember_me: bool,
}

impl SessionRecord {
    pub fn new(
        email: impl Into<String>,
        user_id: impl Into<String>,
        token: impl Into<String>,
        expires_in: i64,
        refresh_token: impl Into<String>,
        remember_me: bool,
    ) -> Self {
        Self {
            email: email.into(),
            user_id: user_id.into(),
            token: token.into(),
            refresh_token: refresh_token.into(),
            created_at: Utc::now(),
            expires_in,
            remember_me,
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Get the bearer token, or `None` once the session has expired
    pub fn token(&self) -> Option<&str> {
        if self.is_expired() {
            None
        } else {
            Some(&self.token)
        }
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn remember_me(&self) -> bool {
        self.remember_me
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_in_seconds(&self) -> i64 {
        self.expires_in
    }

    /// Expiry instant. A lifetime that cannot be represented reads as
    /// expired at creation.
    pub fn expires_at(&self) -> DateTime<Utc> {
        Duration::try_seconds(self.expires_in)
            .and_then(|lifetime| self.created_at.checked_add_signed(lifetime))
            .unwrap_or(self.created_at)
    }

    /// The expiry instant itself counts as expired, so a zero lifetime is
    /// expired from the moment of construction.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at()
    }

    /// Time left until the token should be refreshed. Zero means refresh now.
    pub fn time_to_refresh(&self) -> std::time::Duration {
        let threshold = Duration::minutes(TOKEN_REFRESH_THRESHOLD_MINUTES);
        let Some(refresh_at) = self.expires_at().checked_sub_signed(threshold) else {
            return std::time::Duration::ZERO;
        };
        (refresh_at - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }

    /// Build the successor record after a token refresh.
    ///
    /// Identity fields and the remember-me choice carry over; the clock restarts.
    pub fn with_updated_tokens(
        &self,
        token: impl Into<String>,
        expires_in: i64,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self::new(
            self.email.clone(),
            self.user_id.clone(),
            token,
            expires_in,
            refresh_token,
            self.remember_me,
        )
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            email: self.email.clone(),
            user_id: self.user_id.clone(),
            token: self.token.clone(),
            refresh_token: self.refresh_token.clone(),
            created_at: self.created_at,
            expires_in: self.expires_in,
            remember_me: self.remember_me,
        }
    }
}

/// Rebuild a record from storage, rejecting lifetimes no provider would issue.
impl TryFrom<SessionSnapshot> for SessionRecord {
    type Error = InvalidLifetime;

    fn try_from(snapshot: SessionSnapshot) -> Result<Self, Self::Error> {
        Ok(Self {
            email: snapshot.email,
            user_id: snapshot.user_id,
            token: snapshot.token,
            refresh_token: snapshot.refresh_token,
            created_at: snapshot.created_at,
            expires_in: validate_lifetime(snapshot.expires_in)?,
            remember_me: snapshot.remember_me,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(expires_in: i64) -> SessionRecord {
        SessionRecord::new("a@b.com", "uid-1", "T1", expires_in, "R1", true)
    }

    #[test]
    fn test_fresh_record_is_not_expired() {
        let session = record(3600);
        assert!(!session.is_expired());
        assert_eq!(session.token(), Some("T1"));
    }

    #[test]
    fn test_zero_lifetime_is_expired_immediately() {
        let session = record(0);
        assert!(session.is_expired());
        assert_eq!(session.token(), None);
        assert_eq!(session.time_to_refresh(), std::time::Duration::ZERO);
    }

    #[test]
    fn test_expired_record_hides_token() {
        let mut session = record(3600);
        session.created_at = Utc::now() - Duration::seconds(3601);
        assert!(session.is_expired());
        assert_eq!(session.token(), None);
        assert_eq!(session.refresh_token(), "R1");
    }

    #[test]
    fn test_time_to_refresh_subtracts_threshold() {
        let session = record(3600);
        let remaining = session.time_to_refresh().as_secs();
        // 3600s lifetime minus the 300s threshold, allowing for test latency
        assert!(remaining <= 3300);
        assert!(remaining >= 3290);
    }

    #[test]
    fn test_time_to_refresh_is_zero_inside_threshold() {
        let mut session = record(3600);
        session.created_at = Utc::now() - Duration::seconds(3600 - 240);
        assert!(!session.is_expired());
        assert_eq!(session.time_to_refresh(), std::time::Duration::ZERO);

        // Lifetimes shorter than the threshold refresh straight away
        assert_eq!(record(120).time_to_refresh(), std::time::Duration::ZERO);
    }

    #[test]
    fn test_with_updated_tokens_restarts_clock() {
        let mut old = record(3600);
        old.created_at = Utc::now() - Duration::hours(2);
        assert!(old.is_expired());

        let renewed = old.with_updated_tokens("T2", 3600, "R2");
        assert!(!renewed.is_expired());
        assert_eq!(renewed.token(), Some("T2"));
        assert_eq!(renewed.refresh_token(), "R2");
        assert_eq!(renewed.email(), "a@b.com");
        assert_eq!(renewed.user_id(), "uid-1");
        assert!(renewed.remember_me());
        assert!(renewed.created_at() > old.created_at());
    }

    #[test]
    fn test_snapshot_keeps_creation_time() {
        let mut session = record(3600);
        session.created_at = Utc::now() - Duration::minutes(30);

        let json = serde_json::to_string(&session.snapshot()).unwrap();
        assert!(json.contains("\"refreshToken\":\"R1\""));
        assert!(json.contains("\"rememberMe\":true"));

        let snapshot: SessionSnapshot = serde_json::from_str(&json).unwrap();
        let restored = SessionRecord::try_from(snapshot).unwrap();
        assert_eq!(restored, session);
    }

    #[test]
    fn test_unrepresentable_lifetime_reads_as_expired() {
        for expires_in in [1_000_000_000_000_000, i64::MAX, i64::MIN] {
            let session = record(expires_in);
            assert!(session.is_expired());
            assert_eq!(session.token(), None);
            assert_eq!(session.expires_at(), session.created_at());
            assert_eq!(session.time_to_refresh(), std::time::Duration::ZERO);
        }
    }

    #[test]
    fn test_snapshot_with_out_of_range_lifetime_is_rejected() {
        let mut snapshot = record(3600).snapshot();
        snapshot.expires_in = 9_000_000_000_000_000_000;
        assert_eq!(
            SessionRecord::try_from(snapshot.clone()),
            Err(InvalidLifetime(9_000_000_000_000_000_000))
        );

        snapshot.expires_in = -1;
        assert!(SessionRecord::try_from(snapshot).is_err());
    }

    #[test]
    fn test_validate_lifetime_bounds() {
        assert_eq!(validate_lifetime(0), Ok(0));
        assert_eq!(validate_lifetime(MAX_TOKEN_LIFETIME_SECS), Ok(MAX_TOKEN_LIFETIME_SECS));
        assert!(validate_lifetime(MAX_TOKEN_LIFETIME_SECS + 1).is_err());
        assert!(validate_lifetime(-60).is_err());
    }
}
