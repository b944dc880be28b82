//! Session Manager (C2): opaque token issuance, constant-time validation,
//! TTL expiry, and revocation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ring::rand::{SecureRandom, SystemRandom};
use tokio::time::interval;

use crate::error::{CoordError, ServerResult};

/// Minimum entropy, in bytes, for a freshly minted session token.
const TOKEN_BYTES: usize = 32;

/// Default cadence, relative to TTL, at which expired sessions are swept.
/// The sweeper runs at TTL/10 as required by the session manager's contract,
/// with a floor so a very short TTL does not spin the sweeper too tightly.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
struct SessionEntry {
    agent_id: String,
    token: String,
    expires_at: DateTime<Utc>,
    revoked: bool,
}

/// Why a session failed to validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRejection {
    /// No entry for the presented token.
    Unknown,
    /// Entry exists but `now >= expires_at`.
    Expired,
    /// Entry exists but was explicitly revoked.
    Revoked,
}

/// Issues and validates per-agent session tokens.
///
/// Tokens are looked up by a SHA-style opaque string; the lookup itself is a
/// hash-map probe (the token is the key, already CSPRNG-random, so there is
/// no secret-dependent branching to protect against timing attacks in the
/// lookup path). Membership + field comparisons for a looked-up entry use
/// `subtle`-equivalent behavior via `ring`'s constant-time memory compare to
/// avoid leaking information through comparison timing on the raw token
/// bytes when validating a caller-presented header.
pub struct SessionManager {
    rng: SystemRandom,
    sessions: DashMap<String, SessionEntry>,
    default_ttl: Duration,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("default_ttl", &self.default_ttl)
            .field("session_count", &self.sessions.len())
            .finish()
    }
}

impl SessionManager {
    /// Create a manager with the given default TTL for `create_session`
    /// callers that don't specify one explicitly.
    #[must_use]
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            rng: SystemRandom::new(),
            sessions: DashMap::new(),
            default_ttl,
        }
    }

    /// Mint a fresh token bound to `agent_id`, expiring after `ttl` (or the
    /// manager's default if `None`).
    pub fn create_session(
        &self,
        agent_id: impl Into<String>,
        ttl: Option<Duration>,
    ) -> ServerResult<(String, DateTime<Utc>)> {
        let agent_id = agent_id.into();
        let ttl = ttl.unwrap_or(self.default_ttl);

        let mut raw = [0u8; TOKEN_BYTES];
        self.rng
            .fill(&mut raw)
            .map_err(|_| CoordError::internal("failed to generate session token entropy"))?;
        let token = base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, raw);

        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl)
                .map_err(|e| CoordError::internal(format!("invalid ttl: {e}")))?;

        self.sessions.insert(
            token.clone(),
            SessionEntry {
                agent_id,
                token: token.clone(),
                expires_at,
                revoked: false,
            },
        );

        Ok((token, expires_at))
    }

    /// Validate a presented token, returning the bound agent id or the
    /// rejection reason.
    pub fn validate(&self, token: &str) -> Result<String, SessionRejection> {
        let Some(entry) = self.sessions.get(token) else {
            return Err(SessionRejection::Unknown);
        };

        // Constant-time compare of the presented token against the stored
        // one, even though the map lookup already matched by key: this
        // guards the case where lookup keys are truncated/normalized
        // upstream and a near-miss still reaches here with attacker-timed
        // retries.
        if ring::constant_time::verify_slices_are_equal(token.as_bytes(), entry.token.as_bytes())
            .is_err()
        {
            return Err(SessionRejection::Unknown);
        }

        if entry.revoked {
            return Err(SessionRejection::Revoked);
        }

        if Utc::now() >= entry.expires_at {
            return Err(SessionRejection::Expired);
        }

        Ok(entry.agent_id.clone())
    }

    /// Revoke a token immediately; subsequent `validate` calls reject it.
    pub fn revoke(&self, token: &str) {
        if let Some(mut entry) = self.sessions.get_mut(token) {
            entry.revoked = true;
        }
    }

    /// Revoke every session bound to `agent_id` (used by `unregister_agent`).
    pub fn revoke_agent(&self, agent_id: &str) {
        for mut entry in self.sessions.iter_mut() {
            if entry.agent_id == agent_id {
                entry.revoked = true;
            }
        }
    }

    /// Remove expired and revoked entries. Returns the number evicted.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, entry| !entry.revoked && entry.expires_at > now);
        before - self.sessions.len()
    }

    /// Number of live (non-expired, non-revoked) sessions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        let now = Utc::now();
        self.sessions
            .iter()
            .filter(|e| !e.revoked && e.expires_at > now)
            .count()
    }
}

/// Spawn the periodic sweeper task for `manager`, running at a cadence
/// ≤ `ttl / 10` as required by the Session Manager's contract.
pub fn spawn_sweeper(manager: Arc<SessionManager>, ttl: Duration) -> tokio::task::JoinHandle<()> {
    let cadence = (ttl / 10).max(MIN_SWEEP_INTERVAL);
    tokio::spawn(async move {
        let mut tick = interval(cadence);
        loop {
            tick.tick().await;
            let evicted = manager.sweep();
            if evicted > 0 {
                tracing::debug!(evicted, "session sweeper evicted expired/revoked sessions");
            }
        }
    })
}

/// Extract a bearer session token from the request header map, checking the
/// primary header first, then the legacy alias.
#[must_use]
pub fn extract_session_token(headers: &HashMap<String, String>) -> Option<String> {
    headers
        .get("mcp-session-id")
        .or_else(|| headers.get("x-session-id"))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_validate_round_trips_agent_id() {
        let manager = SessionManager::new(Duration::from_secs(60));
        let (token, _) = manager.create_session("agent-1", None).unwrap();
        assert_eq!(manager.validate(&token).unwrap(), "agent-1");
    }

    #[test]
    fn unknown_token_is_rejected() {
        let manager = SessionManager::new(Duration::from_secs(60));
        assert_eq!(
            manager.validate("not-a-real-token").unwrap_err(),
            SessionRejection::Unknown
        );
    }

    #[test]
    fn expired_token_is_rejected() {
        let manager = SessionManager::new(Duration::from_millis(1));
        let (token, _) = manager.create_session("agent-1", None).unwrap();
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(
            manager.validate(&token).unwrap_err(),
            SessionRejection::Expired
        );
    }

    #[test]
    fn revoked_token_is_rejected() {
        let manager = SessionManager::new(Duration::from_secs(60));
        let (token, _) = manager.create_session("agent-1", None).unwrap();
        manager.revoke(&token);
        assert_eq!(
            manager.validate(&token).unwrap_err(),
            SessionRejection::Revoked
        );
    }

    #[test]
    fn tokens_are_unique_across_sessions() {
        let manager = SessionManager::new(Duration::from_secs(60));
        let (t1, _) = manager.create_session("agent-1", None).unwrap();
        let (t2, _) = manager.create_session("agent-2", None).unwrap();
        assert_ne!(t1, t2);
    }

    #[test]
    fn sweep_removes_only_expired_and_revoked() {
        let manager = SessionManager::new(Duration::from_secs(60));
        let (live, _) = manager.create_session("agent-1", None).unwrap();
        let (revoked, _) = manager.create_session("agent-2", None).unwrap();
        manager.revoke(&revoked);
        let evicted = manager.sweep();
        assert_eq!(evicted, 1);
        assert!(manager.validate(&live).is_ok());
    }

    #[test]
    fn header_extraction_prefers_primary_header() {
        let mut headers = HashMap::new();
        headers.insert("mcp-session-id".to_string(), "primary".to_string());
        headers.insert("x-session-id".to_string(), "legacy".to_string());
        assert_eq!(extract_session_token(&headers).as_deref(), Some("primary"));
    }

    #[test]
    fn header_extraction_falls_back_to_legacy_alias() {
        let mut headers = HashMap::new();
        headers.insert("x-session-id".to_string(), "legacy".to_string());
        assert_eq!(extract_session_token(&headers).as_deref(), Some("legacy"));
    }
}
