//! The login resolution path: read-through session cache over the primary
//! user store.
//!
//! A login first consults the cache under the normalized email. A cached
//! snapshot authenticates only while its embedded freshness marker equals the
//! current `updated_at` of the primary record; any mismatch, decode failure
//! or backend error degrades to ordinary password verification against the
//! primary store. Nothing ever invalidates the cache on write — a mutated
//! record simply stops matching at the next login.

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};
use tracing::{debug, warn};

use crate::auth::dto::PublicUser;
use crate::auth::jwt::JwtKeys;
use crate::auth::password::verify_password;
use crate::auth::repo::UserStore;
use crate::auth::repo_types::{User, UserSnapshot};
use crate::cache::{session_key, SessionCache};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user not found")]
    NotFound,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// Knobs for the login path. `verify_on_cache_hit` trades the saved hash
/// lookup for re-checking the password even when the snapshot is fresh.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub cache_ttl_seconds: u64,
    pub verify_on_cache_hit: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: 3600,
            verify_on_cache_hit: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSource {
    Cache,
    Primary,
}

#[derive(Debug)]
pub struct ResolvedSession {
    pub user: PublicUser,
    pub token: String,
    pub source: SessionSource,
}

/// Renders a freshness marker to its canonical form. Both the snapshot and
/// the primary record go through this before any comparison, so a marker that
/// round-tripped through the cache as text still compares equal.
pub fn canonical_marker(ts: OffsetDateTime) -> anyhow::Result<String> {
    Ok(ts.to_offset(UtcOffset::UTC).format(&Rfc3339)?)
}

pub async fn resolve_session(
    store: &dyn UserStore,
    cache: &dyn SessionCache,
    keys: &JwtKeys,
    options: &SessionOptions,
    email: &str,
    password: &str,
) -> Result<ResolvedSession, AuthError> {
    let email = email.trim().to_lowercase();

    let user = store
        .find_by_email(&email)
        .await?
        .ok_or(AuthError::NotFound)?;
    let marker = canonical_marker(user.updated_at)?;
    let key = session_key(&email);

    if let Some(snapshot) = load_snapshot(cache, &key).await {
        if snapshot.updated_at == marker {
            if options.verify_on_cache_hit {
                check_password(store, &user, password).await?;
            }
            debug!(user_id = %user.id, "session resolved from cache");
            let token = keys.sign(snapshot.id, &snapshot.name, &snapshot.email, snapshot.role)?;
            return Ok(ResolvedSession {
                user: PublicUser::from(&snapshot),
                token,
                source: SessionSource::Cache,
            });
        }

        // The record changed after the snapshot was written. Drop the entry;
        // the fall-through re-verifies and rewrites it.
        debug!(user_id = %user.id, "stale session snapshot");
        if let Err(e) = cache.delete(&key).await {
            warn!(error = %e, "session cache delete failed");
        }
    }

    check_password(store, &user, password).await?;

    match serde_json::to_string(&UserSnapshot::capture(&user, marker)) {
        Ok(body) => {
            if let Err(e) = cache.set(&key, &body, options.cache_ttl_seconds).await {
                warn!(error = %e, "session cache write failed");
            }
        }
        Err(e) => warn!(error = %e, "session snapshot serialization failed"),
    }

    let token = keys.sign(user.id, &user.name, &user.email, user.role)?;
    debug!(user_id = %user.id, "session resolved from primary store");
    Ok(ResolvedSession {
        user: PublicUser::from(&user),
        token,
        source: SessionSource::Primary,
    })
}

async fn check_password(
    store: &dyn UserStore,
    user: &User,
    password: &str,
) -> Result<(), AuthError> {
    let hash = store
        .password_hash(user.id)
        .await?
        .ok_or(AuthError::NotFound)?;
    if !verify_password(password, &hash)? {
        return Err(AuthError::InvalidCredentials);
    }
    Ok(())
}

async fn load_snapshot(cache: &dyn SessionCache, key: &str) -> Option<UserSnapshot> {
    let raw = match cache.get(key).await {
        Ok(v) => v?,
        Err(e) => {
            warn!(error = %e, "session cache lookup failed");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            // An undecodable snapshot is poison; remove it so the next login
            // does not pay for the parse again.
            warn!(error = %e, "undecodable session snapshot, deleting");
            if let Err(e) = cache.delete(key).await {
                warn!(error = %e, "session cache delete failed");
            }
            None
        }
    }
}
